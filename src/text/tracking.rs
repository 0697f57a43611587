//! Forward translation of spans across edits.

use super::buffer::{Snapshot, TextChange};
use super::span::SnapshotSpan;

/// How the edges of a tracked span react to insertions exactly at them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingMode {
    /// Text inserted at either edge stays outside the span
    #[default]
    EdgeExclusive,
    /// Text inserted at either edge becomes part of the span
    EdgeInclusive,
}

impl TrackingMode {
    /// Whether (start, end) move forward past text inserted at their position
    fn edge_polarity(self) -> (bool, bool) {
        match self {
            TrackingMode::EdgeExclusive => (true, false),
            TrackingMode::EdgeInclusive => (false, true),
        }
    }
}

fn translate_point(position: usize, change: &TextChange, positive: bool) -> usize {
    if position < change.position {
        position
    } else if position > change.old_end() || (position == change.old_end() && change.old_len > 0)
    {
        position - change.old_len + change.new_len
    } else if positive {
        change.new_end()
    } else {
        change.position
    }
}

pub(crate) fn translate_span(
    span: &SnapshotSpan,
    target: &Snapshot,
    mode: TrackingMode,
) -> Option<SnapshotSpan> {
    let changes = span.snapshot().changes_to(target)?;
    let (start_positive, end_positive) = mode.edge_polarity();

    let (mut start, mut end) = (span.start(), span.end());
    for change in &changes {
        let new_start = translate_point(start, change, start_positive);
        let new_end = translate_point(end, change, end_positive);
        start = new_start;
        // Edits swallowing the whole span collapse it to an empty span
        end = new_end.max(new_start);
    }

    Some(SnapshotSpan::new(target.clone(), start, end))
}

/// A span that can be re-mapped onto later snapshots of its buffer.
///
/// Translation is best effort: a span whose text was deleted collapses to an
/// empty span, and snapshots of other buffers (or older ones) cannot be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingSpan {
    origin: SnapshotSpan,
    mode: TrackingMode,
}

impl TrackingSpan {
    pub fn new(origin: SnapshotSpan, mode: TrackingMode) -> Self {
        Self { origin, mode }
    }

    pub fn origin(&self) -> &SnapshotSpan {
        &self.origin
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    /// The equivalent span on `snapshot`, if it can be reached
    pub fn span_on(&self, snapshot: &Snapshot) -> Option<SnapshotSpan> {
        if self.origin.snapshot() == snapshot {
            return Some(self.origin.clone());
        }
        translate_span(&self.origin, snapshot, self.mode)
    }
}
