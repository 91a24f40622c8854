//! Metric helpers for `wsframe`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::counter;

/// Name of the counter tracking processed frames.
pub const FRAMES_PROCESSED: &str = "wsframe_frames_processed_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "wsframe_errors_total";
/// Name of the counter tracking connections reaching a terminal state.
pub const CLOSES_TOTAL: &str = "wsframe_closes_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Frames decoded from the peer.
    Inbound,
    /// Frames encoded for the peer.
    Outbound,
}

impl Direction {
    /// Label value used in metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Record a processed frame for the given direction.
#[cfg(feature = "metrics")]
pub fn inc_frames(direction: Direction) {
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
}

/// Record an error occurrence, labelled with its kind.
#[cfg(feature = "metrics")]
pub fn inc_errors(kind: &'static str) { counter!(ERRORS_TOTAL, "kind" => kind).increment(1); }

/// Record a connection reaching a terminal state.
#[cfg(feature = "metrics")]
pub fn inc_closes(clean: bool) {
    let clean = if clean { "true" } else { "false" };
    counter!(CLOSES_TOTAL, "clean" => clean).increment(1);
}

/// No-op without the `metrics` feature.
#[cfg(not(feature = "metrics"))]
pub fn inc_frames(_direction: Direction) {}

/// No-op without the `metrics` feature.
#[cfg(not(feature = "metrics"))]
pub fn inc_errors(_kind: &'static str) {}

/// No-op without the `metrics` feature.
#[cfg(not(feature = "metrics"))]
pub fn inc_closes(_clean: bool) {}
