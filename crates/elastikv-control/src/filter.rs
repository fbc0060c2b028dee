//! Single-pole exponential smoothing filter.

/// Smooths a scalar signal with `alpha * previous + (1 - alpha) * input`.
///
/// The first input after construction or [`reset`](Filter::reset) passes
/// through unchanged so the filter never has to warm up from zero.
#[derive(Debug)]
pub struct Filter {
    alpha: f64,
    last: f64,
    first_input: bool,
}

impl Filter {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            last: 0.0,
            first_input: true,
        }
    }

    /// Feed one sample through the filter and return the smoothed value.
    pub fn step(&mut self, input: f64) -> f64 {
        let out = if self.first_input {
            self.first_input = false;
            input
        } else {
            self.last * self.alpha + input * (1.0 - self.alpha)
        };
        self.last = out;
        out
    }

    /// Last smoothed value, without mutating the filter.
    pub fn value(&self) -> f64 {
        self.last
    }

    /// Forget the history; the next [`step`](Filter::step) passes its
    /// input through unchanged.
    pub fn reset(&mut self) {
        self.first_input = true;
    }
}
