//! Immutable, versioned text snapshots and the span types the tagger works with.
//!
//! A [`TextBuffer`] produces a new [`Snapshot`] for every edit. Each snapshot
//! records the change that led to its successor, so spans and points can be
//! translated forward from an old snapshot to a newer one.

mod buffer;
mod line_range;
mod span;
mod tracking;

pub use buffer::{Snapshot, TextBuffer, TextChange};
pub use line_range::{LineRange, NormalizedLineRangeCollection, SnapshotLineRange};
pub use span::{SnapshotSpan, Span};
pub use tracking::{TrackingMode, TrackingSpan};
