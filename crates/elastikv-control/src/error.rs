//! Error types for the control primitives.

use thiserror::Error;

/// Errors that can occur while evaluating a control model.
#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    /// The demand ray is parallel to the reference line (or degenerate),
    /// so no sustainable-throughput estimate exists for this mix.
    #[error("degenerate feed-forward model: demand ray does not intersect the reference line")]
    DegenerateModel,
}
