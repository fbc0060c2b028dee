//! Feed-forward throughput classifier.
//!
//! The model is a reference line through two points in
//! (read-throughput, mixed-throughput) space, obtained from offline
//! system identification. The line is the per-node saturation boundary:
//! any point on it is a read/write mix one node can just sustain at the
//! latency operating point.

use tracing::debug;

use crate::error::ControlError;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

/// Maps an observed read/mixed throughput mix to the total throughput a
/// single node can sustain at that same mix ratio.
#[derive(Debug)]
pub struct FeedForwardClassifier {
    p1: Point,
    p2: Point,
}

impl FeedForwardClassifier {
    /// Build the model from the two identified reference points
    /// `(read1, mixed1)` and `(read2, mixed2)`.
    pub fn new(read1: f64, mixed1: f64, read2: f64, mixed2: f64) -> Self {
        Self {
            p1: Point { x: read1, y: mixed1 },
            p2: Point { x: read2, y: mixed2 },
        }
    }

    /// Estimate the sustainable total throughput of one node serving the
    /// given read/mixed mix.
    ///
    /// Geometrically: intersect the ray from the origin through
    /// `(read_tp, mixed_tp)` with the reference line and return the sum
    /// of the intersection coordinates. Fails when the two lines are
    /// parallel (or the input mix is degenerate), which the caller must
    /// treat as "no feed-forward estimate this period".
    pub fn classify(&self, read_tp: f64, mixed_tp: f64) -> Result<f64, ControlError> {
        let origin = Point { x: 0.0, y: 0.0 };
        let demand = Point {
            x: read_tp,
            y: mixed_tp,
        };
        let at = intersection(self.p1, self.p2, origin, demand)?;
        debug!(x = at.x, y = at.y, "feed-forward intersection");
        Ok(at.x + at.y)
    }
}

/// Intersection of the two infinite lines through (`a1`,`a2`) and
/// (`b1`,`b2`).
fn intersection(a1: Point, a2: Point, b1: Point, b2: Point) -> Result<Point, ControlError> {
    let d = (a1.x - a2.x) * (b1.y - b2.y) - (a1.y - a2.y) * (b1.x - b2.x);
    if d == 0.0 {
        return Err(ControlError::DegenerateModel);
    }

    let cross_a = a1.x * a2.y - a1.y * a2.x;
    let cross_b = b1.x * b2.y - b1.y * b2.x;
    let xi = ((b1.x - b2.x) * cross_a - (a1.x - a2.x) * cross_b) / d;
    let yi = ((b1.y - b2.y) * cross_a - (a1.y - a2.y) * cross_b) / d;
    Ok(Point { x: xi, y: yi })
}
