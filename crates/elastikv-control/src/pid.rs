//! PID controller over a normalized error signal.

use tracing::warn;

/// Largest error magnitude the controller will act on.
const ERROR_LIMIT: f64 = 2.0e7;
/// Integral magnitude that counts as windup.
const INTEGRAL_LIMIT: f64 = 1.0e7;
/// Value the integral is reset to (sign-preserving) on windup. Resetting
/// instead of clamping lets the controller recover quickly once the error
/// changes sign.
const INTEGRAL_RESET: f64 = 1.5e6;

/// Classic PID controller.
///
/// Inputs are normalized against an operating point before the error is
/// computed; the output is an incremental adjustment the caller adds to
/// the currently observed output signal.
#[derive(Debug)]
pub struct PidController {
    /// Operating point for the input (the filtered measured output of the
    /// controlled system).
    input_op: f64,
    /// Desired value for the normalized input, typically 0.
    setpoint: f64,
    kp: f64,
    ki: f64,
    kd: f64,

    integral: f64,
    prev_error: f64,
    first_step: bool,
}

impl PidController {
    pub fn new(input_op: f64, setpoint: f64, kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            input_op,
            setpoint,
            kp,
            ki,
            kd,
            integral: 0.0,
            prev_error: 0.0,
            first_step: true,
        }
    }

    /// Compute the next control value from the current (filtered,
    /// non-normalized) system output.
    pub fn step(&mut self, input: f64) -> f64 {
        let normalized = input - self.input_op;
        let mut error = self.setpoint - normalized;

        if error > ERROR_LIMIT {
            warn!(error, "very large positive control error, clamping");
            error = ERROR_LIMIT;
        } else if error < -ERROR_LIMIT {
            warn!(error, "very large negative control error, clamping");
            error = -ERROR_LIMIT;
        }

        // Seed the previous error on the first step so the derivative
        // term does not spike on startup.
        if self.first_step {
            self.prev_error = error;
            self.first_step = false;
        }

        self.integral += error;
        if self.integral > INTEGRAL_LIMIT {
            warn!(integral = self.integral, "positive integrator windup, resetting");
            self.integral = INTEGRAL_RESET;
        } else if self.integral < -INTEGRAL_LIMIT {
            warn!(integral = self.integral, "negative integrator windup, resetting");
            self.integral = -INTEGRAL_RESET;
        }

        let derivative = error - self.prev_error;
        let output = self.kp * error + self.ki * self.integral + self.kd * derivative;

        self.prev_error = error;
        output
    }

    /// Forget accumulated history and re-arm first-step seeding.
    ///
    /// Called whenever control switches away from the PID path: when it
    /// later switches back the situation has usually changed enough that
    /// the old integral and error history would only mislead it.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.first_step = true;
    }
}
