//! Configuration types for the elastikv controller.
//!
//! Defaults match the operating values the controller was identified
//! with; every field can be overridden from the TOML config file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Controller (decision engine) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Operating point for the input signal (filtered read p99 latency,
    /// in the probes' reporting unit — nanoseconds).
    pub input_op: f64,
    /// Operating point for the output signal (throughput per node, ops/s).
    pub output_op: f64,
    /// Normalized setpoint for the PID controller. Conventionally 0.
    pub setpoint: f64,
    /// PID gains.
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Smoothing factor for the latency filter.
    pub filter_alpha: f64,
    /// Sampling periods to wait before the controller takes any action.
    pub warmup_periods: u32,
    /// Dead-band width around the input operating point.
    pub dead_band: f64,
    /// Per-node throughput swing that flags a load spike for the
    /// feed-forward path.
    pub ff_throughput_delta: f64,
    /// Feed-forward model: reference line through (read1, mixed1) and
    /// (read2, mixed2) in throughput space, from offline identification.
    pub ff_read1: f64,
    pub ff_mixed1: f64,
    pub ff_read2: f64,
    pub ff_mixed2: f64,
    /// Periods to wait between feed-forward corrections.
    pub ff_cooldown_periods: u64,
    /// Sampling period length in seconds.
    pub sampling_interval_secs: u64,
    /// Per-probe read timeout in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            // Latency values are in nanoseconds: 6 ms read p99.
            input_op: 6_000_000.0,
            output_op: 1400.0,
            setpoint: 0.0,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            filter_alpha: 0.4,
            warmup_periods: 4,
            dead_band: 500_000.0,
            ff_throughput_delta: 1400.0,
            ff_read1: 1980.0,
            ff_mixed1: 220.0,
            ff_read2: 0.0,
            ff_mixed2: 1000.0,
            ff_cooldown_periods: 4,
            sampling_interval_secs: 300,
            probe_timeout_secs: 40,
        }
    }
}

impl ControlConfig {
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Storage-node fleet bounds and actuator pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Hard lower bound on cluster size.
    pub min_nodes: u32,
    /// Hard upper bound on cluster size.
    pub max_nodes: u32,
    /// Largest node-count change a limited task may apply at once.
    pub max_step: u32,
    /// When false the actuator only rebalances and never touches nodes.
    pub provision_nodes: bool,
    /// Wait after new nodes report ready, for their service process to
    /// become reachable.
    pub node_settle_secs: u64,
    /// Wait after each rebalance before draining the next task.
    pub post_rebalance_settle_secs: u64,
    /// Pause between node decommissions on scale-down.
    pub decommission_delay_ms: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            min_nodes: 3,
            max_nodes: 27,
            max_step: 7,
            provision_nodes: true,
            node_settle_secs: 120,
            post_rebalance_settle_secs: 120,
            decommission_delay_ms: 1000,
        }
    }
}

impl FleetConfig {
    pub fn node_settle(&self) -> Duration {
        Duration::from_secs(self.node_settle_secs)
    }

    pub fn post_rebalance_settle(&self) -> Duration {
        Duration::from_secs(self.post_rebalance_settle_secs)
    }

    pub fn decommission_delay(&self) -> Duration {
        Duration::from_millis(self.decommission_delay_ms)
    }
}

/// Keyspace partitioning parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Total partitions in the keyspace. Constant for the lifetime of
    /// the store regardless of node count.
    pub total_partitions: u32,
    /// Replication factor, also the number of zones in the descriptor.
    pub replication_factor: u32,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            total_partitions: 90,
            replication_factor: 3,
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub control: ControlConfig,
    pub fleet: FleetConfig,
    pub partition: PartitionConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg = toml::from_str(&raw)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert!(cfg.fleet.min_nodes <= cfg.fleet.max_nodes);
        assert!(cfg.control.filter_alpha > 0.0 && cfg.control.filter_alpha < 1.0);
        assert_eq!(cfg.partition.total_partitions, 90);
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [fleet]
            max_nodes = 12
            provision_nodes = false

            [control]
            input_op = 8000.0
            "#,
        )
        .unwrap();

        assert_eq!(cfg.fleet.max_nodes, 12);
        assert!(!cfg.fleet.provision_nodes);
        assert_eq!(cfg.control.input_op, 8000.0);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.fleet.min_nodes, 3);
        assert_eq!(cfg.partition.replication_factor, 3);
    }

    #[test]
    fn durations_convert() {
        let fleet = FleetConfig {
            decommission_delay_ms: 250,
            ..Default::default()
        };
        assert_eq!(fleet.decommission_delay(), Duration::from_millis(250));
        assert_eq!(fleet.node_settle(), Duration::from_secs(120));
    }
}
