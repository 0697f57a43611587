use std::fmt;

use super::buffer::Snapshot;
use super::span::SnapshotSpan;

/// A range of whole lines: `count` lines starting at `start_line`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRange {
    start_line: usize,
    count: usize,
}

impl LineRange {
    pub fn new(start_line: usize, count: usize) -> Self {
        Self { start_line, count }
    }

    /// Create from an inclusive pair of line numbers
    pub fn from_bounds(start_line: usize, last_line: usize) -> Self {
        debug_assert!(start_line <= last_line);
        Self::new(start_line, last_line.saturating_sub(start_line) + 1)
    }

    pub fn start_line(&self) -> usize {
        self.start_line
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn last_line_number(&self) -> usize {
        (self.start_line + self.count).saturating_sub(1).max(self.start_line)
    }

    pub fn end_line_exclusive(&self) -> usize {
        self.start_line + self.count
    }

    pub fn lines(&self) -> std::ops::Range<usize> {
        self.start_line..self.end_line_exclusive()
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.lines().contains(&line)
    }

    pub fn contains(&self, other: &LineRange) -> bool {
        self.start_line <= other.start_line && other.end_line_exclusive() <= self.end_line_exclusive()
    }

    /// Whether the ranges share at least one line
    pub fn intersects(&self, other: &LineRange) -> bool {
        self.start_line.max(other.start_line)
            < self.end_line_exclusive().min(other.end_line_exclusive())
    }

    fn touches(&self, other: &LineRange) -> bool {
        other.start_line <= self.end_line_exclusive() && self.start_line <= other.end_line_exclusive()
    }

    pub fn intersect(&self, other: &LineRange) -> Option<LineRange> {
        if !self.intersects(other) {
            return None;
        }
        let start = self.start_line.max(other.start_line);
        let end = self.end_line_exclusive().min(other.end_line_exclusive());
        Some(LineRange::new(start, end - start))
    }

    /// The smallest range covering both
    pub fn union(&self, other: &LineRange) -> LineRange {
        let start = self.start_line.min(other.start_line);
        let end = self.end_line_exclusive().max(other.end_line_exclusive());
        LineRange::new(start, end - start)
    }

    /// Split into consecutive pieces of at most `max_lines` lines
    pub fn split(&self, max_lines: usize) -> Vec<LineRange> {
        let max_lines = max_lines.max(1);
        let mut pieces = Vec::with_capacity(self.count.div_ceil(max_lines));
        let mut start = self.start_line;
        while start < self.end_line_exclusive() {
            let count = max_lines.min(self.end_line_exclusive() - start);
            pieces.push(LineRange::new(start, count));
            start += count;
        }
        pieces
    }
}

impl fmt::Debug for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LineRange({}..{})", self.start_line, self.end_line_exclusive())
    }
}

/// A line range bound to one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotLineRange {
    snapshot: Snapshot,
    line_range: LineRange,
}

impl SnapshotLineRange {
    /// Create a line range, clamping it to the lines of `snapshot`
    pub fn new(snapshot: Snapshot, line_range: LineRange) -> Self {
        let last = snapshot.last_line_number();
        let start = line_range.start_line().min(last);
        let end = line_range.last_line_number().min(last).max(start);
        Self {
            snapshot,
            line_range: LineRange::from_bounds(start, end),
        }
    }

    /// Every line of the snapshot
    pub fn for_extent(snapshot: Snapshot) -> Self {
        let count = snapshot.line_count();
        Self::new(snapshot, LineRange::new(0, count))
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn line_range(&self) -> LineRange {
        self.line_range
    }

    pub fn start_line(&self) -> usize {
        self.line_range.start_line()
    }

    pub fn count(&self) -> usize {
        self.line_range.count()
    }

    pub fn last_line_number(&self) -> usize {
        self.line_range.last_line_number()
    }

    /// Span from the start of the first line to the end of the last, excluding its break
    pub fn extent(&self) -> SnapshotSpan {
        SnapshotSpan::new(
            self.snapshot.clone(),
            self.snapshot.line_start(self.start_line()),
            self.snapshot.line_end(self.last_line_number()),
        )
    }

    /// Span from the start of the first line through the last line's break
    pub fn extent_including_line_break(&self) -> SnapshotSpan {
        SnapshotSpan::new(
            self.snapshot.clone(),
            self.snapshot.line_start(self.start_line()),
            self.snapshot
                .line_end_including_break(self.last_line_number()),
        )
    }

    pub fn intersect(&self, other: &LineRange) -> Option<SnapshotLineRange> {
        self.line_range
            .intersect(other)
            .map(|range| SnapshotLineRange::new(self.snapshot.clone(), range))
    }
}

/// Sorted, merged set of line ranges.
///
/// Overlapping and adjacent ranges are coalesced on insert, so any range fully
/// covered by the collection is contained in exactly one stored range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedLineRangeCollection {
    ranges: Vec<LineRange>,
}

impl NormalizedLineRangeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, range: LineRange) {
        if range.is_empty() {
            return;
        }

        let position = self
            .ranges
            .partition_point(|existing| existing.start_line() < range.start_line());
        self.ranges.insert(position, range);

        let mut merged: Vec<LineRange> = Vec::with_capacity(self.ranges.len());
        for current in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if last.touches(&current) => *last = last.union(&current),
                _ => merged.push(current),
            }
        }
        self.ranges = merged;
    }

    pub fn contains(&self, range: &LineRange) -> bool {
        self.ranges.iter().any(|existing| existing.contains(range))
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.ranges.iter().any(|existing| existing.contains_line(line))
    }

    /// The smallest single range covering everything in the collection
    pub fn overarching_line_range(&self) -> Option<LineRange> {
        let first = self.ranges.first()?;
        let last = self.ranges.last()?;
        Some(first.union(last))
    }

    /// Portions of `range` not covered by the collection, in line order
    pub fn missing(&self, range: &LineRange) -> Vec<LineRange> {
        let mut missing = Vec::new();
        let mut cursor = range.start_line();
        let end = range.end_line_exclusive();

        for existing in &self.ranges {
            if existing.end_line_exclusive() <= cursor {
                continue;
            }
            if existing.start_line() >= end {
                break;
            }
            if existing.start_line() > cursor {
                missing.push(LineRange::new(cursor, existing.start_line() - cursor));
            }
            cursor = cursor.max(existing.end_line_exclusive());
        }

        if cursor < end {
            missing.push(LineRange::new(cursor, end - cursor));
        }
        missing
    }

    pub fn iter(&self) -> impl Iterator<Item = &LineRange> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl FromIterator<LineRange> for NormalizedLineRangeCollection {
    fn from_iter<I: IntoIterator<Item = LineRange>>(iter: I) -> Self {
        let mut collection = Self::new();
        for range in iter {
            collection.add(range);
        }
        collection
    }
}
