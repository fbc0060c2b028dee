//! Per-period telemetry aggregation.
//!
//! Each probe reports already-summarized statistics for its own slice of
//! the workload. Across probes, operation counts are summed (they are
//! volumes) while latency statistics are averaged (they are per-probe
//! summaries of the same distribution). The aggregate is ephemeral:
//! built from scratch every sampling period and discarded after the
//! decision is logged.

/// Per-period summary for one operation class, as reported by one probe.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassSample {
    pub ops: i64,
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

/// Running mean over a scalar reported by several probes.
#[derive(Debug, Clone, Copy, Default)]
struct Accum {
    n: u64,
    sum: f64,
}

impl Accum {
    fn add(&mut self, value: f64) {
        self.n += 1;
        self.sum += value;
    }

    fn mean(&self) -> f64 {
        if self.n == 0 { 0.0 } else { self.sum / self.n as f64 }
    }
}

/// One operation class aggregated across all reporting probes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassAggregate {
    ops: f64,
    mean: Accum,
    stddev: Accum,
    min: Accum,
    p95: Accum,
    p99: Accum,
    max: Accum,
}

impl ClassAggregate {
    fn merge(&mut self, sample: &ClassSample) {
        self.ops += sample.ops as f64;
        self.mean.add(sample.mean);
        self.stddev.add(sample.stddev);
        self.min.add(sample.min);
        self.p95.add(sample.p95);
        self.p99.add(sample.p99);
        self.max.add(sample.max);
    }

    /// Total operations across probes.
    pub fn ops(&self) -> f64 {
        self.ops
    }

    pub fn mean(&self) -> f64 {
        self.mean.mean()
    }

    pub fn stddev(&self) -> f64 {
        self.stddev.mean()
    }

    pub fn min(&self) -> f64 {
        self.min.mean()
    }

    pub fn p95(&self) -> f64 {
        self.p95.mean()
    }

    pub fn p99(&self) -> f64 {
        self.p99.mean()
    }

    pub fn max(&self) -> f64 {
        self.max.mean()
    }
}

/// Everything the decision state machine needs from one sampling period.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodAggregate {
    pub read: ClassAggregate,
    pub mixed: ClassAggregate,
    contributing: usize,
}

impl PeriodAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, sample: &crate::probe::ProbeSample) {
        self.read.merge(&sample.read);
        self.mixed.merge(&sample.mixed);
        self.contributing += 1;
    }

    /// Operations across both classes and all probes.
    pub fn total_ops(&self) -> f64 {
        self.read.ops() + self.mixed.ops()
    }

    /// Probes that contributed a sample this period.
    pub fn contributing(&self) -> usize {
        self.contributing
    }
}
