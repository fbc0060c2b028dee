//! The elastikv decision engine.
//!
//! Once per sampling period the engine polls every registered workload
//! probe for latency/throughput statistics, aggregates them, and runs a
//! multi-state decision procedure that combines a feed-forward
//! throughput classifier with a PID feedback controller. Scaling
//! decisions are handed to the actuator; every period is persisted as
//! one record of the tab-separated control report.

mod engine;
mod probe;
mod report;
mod sample;

pub use engine::DecisionEngine;
pub use probe::{Probe, ProbeError, ProbeRegistry, ProbeSample};
pub use report::{Decision, PeriodRecord, ReportWriter};
pub use sample::{ClassAggregate, ClassSample, PeriodAggregate};
