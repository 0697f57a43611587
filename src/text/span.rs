use std::fmt;

use super::buffer::Snapshot;
use super::line_range::{LineRange, SnapshotLineRange};
use super::tracking::{TrackingMode, translate_span};

/// Half-open byte range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} after end {end}");
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `position` lies inside the span (end exclusive)
    pub fn contains_position(&self, position: usize) -> bool {
        self.start <= position && position < self.end
    }

    /// Whether `other` lies entirely inside this span
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Strict overlap: the spans share at least one position
    pub fn overlaps_with(&self, other: &Span) -> bool {
        self.start.max(other.start) < self.end.min(other.end)
    }

    /// Overlap or adjacency; an empty span intersects anything touching it
    pub fn intersects_with(&self, other: &Span) -> bool {
        other.start <= self.end && other.end >= self.start
    }

    /// The shared portion, if the spans overlap
    pub fn overlap(&self, other: &Span) -> Option<Span> {
        self.overlaps_with(other)
            .then(|| Span::new(self.start.max(other.start), self.end.min(other.end)))
    }

    /// The shared portion, if the spans intersect (may be empty)
    pub fn intersection(&self, other: &Span) -> Option<Span> {
        self.intersects_with(other)
            .then(|| Span::new(self.start.max(other.start), self.end.min(other.end)))
    }
}

/// A span bound to one snapshot
#[derive(Clone, PartialEq, Eq)]
pub struct SnapshotSpan {
    snapshot: Snapshot,
    span: Span,
}

impl SnapshotSpan {
    /// Create a span, clamping both ends to the snapshot
    pub fn new(snapshot: Snapshot, start: usize, end: usize) -> Self {
        let end = end.min(snapshot.len());
        let start = start.min(end);
        Self {
            snapshot,
            span: Span::new(start, end),
        }
    }

    pub fn from_span(snapshot: Snapshot, span: Span) -> Self {
        Self::new(snapshot, span.start, span.end)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn start(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }

    pub fn len(&self) -> usize {
        self.span.len()
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    pub fn text(&self) -> &str {
        &self.snapshot.text()[self.span.start..self.span.end]
    }

    pub fn start_line(&self) -> usize {
        self.snapshot.line_number(self.span.start)
    }

    /// Last line touched by the span. A non-empty span ending exactly at a line
    /// start does not touch that line.
    pub fn last_line(&self) -> usize {
        if self.span.is_empty() {
            self.start_line()
        } else {
            self.snapshot.line_number(self.span.end - 1)
        }
    }

    /// The whole lines this span touches
    pub fn line_range(&self) -> SnapshotLineRange {
        let start = self.start_line();
        SnapshotLineRange::new(
            self.snapshot.clone(),
            LineRange::from_bounds(start, self.last_line()),
        )
    }

    pub fn contains(&self, other: &SnapshotSpan) -> bool {
        self.snapshot == other.snapshot && self.span.contains(&other.span)
    }

    pub fn overlaps_with(&self, other: &SnapshotSpan) -> bool {
        self.snapshot == other.snapshot && self.span.overlaps_with(&other.span)
    }

    pub fn intersects_with(&self, other: &SnapshotSpan) -> bool {
        self.snapshot == other.snapshot && self.span.intersects_with(&other.span)
    }

    /// The smallest span covering both; `None` across snapshots
    pub fn union(&self, other: &SnapshotSpan) -> Option<SnapshotSpan> {
        (self.snapshot == other.snapshot).then(|| {
            SnapshotSpan::new(
                self.snapshot.clone(),
                self.start().min(other.start()),
                self.end().max(other.end()),
            )
        })
    }

    /// Map this span onto a later snapshot of the same buffer
    pub fn translate_to(&self, snapshot: &Snapshot, mode: TrackingMode) -> Option<SnapshotSpan> {
        translate_span(self, snapshot, mode)
    }
}

impl fmt::Debug for SnapshotSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SnapshotSpan(v{} {}..{})",
            self.snapshot.version(),
            self.span.start,
            self.span.end
        )
    }
}
