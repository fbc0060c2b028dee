//! Control primitives for the elastikv decision engine.
//!
//! Two controller families live here: the feedback path (exponential
//! smoothing filter feeding a PID controller) and the feed-forward path
//! (a line-intersection classifier built from offline system
//! identification). The decision engine combines them; nothing in this
//! crate performs IO or holds references to the cluster.

mod classifier;
mod error;
mod filter;
mod pid;

pub use classifier::FeedForwardClassifier;
pub use error::ControlError;
pub use filter::Filter;
pub use pid::PidController;
