//! Scale-task execution for the elastikv controller.
//!
//! The actuator turns signed node-count deltas into bounded scale-up and
//! scale-down actions against the cluster backend, followed by a data
//! rebalance. Exactly one worker may execute at any time — the external
//! rebalance mechanism cannot run two instances concurrently.

mod actuator;

pub use actuator::{Actuator, ScaleTask};
