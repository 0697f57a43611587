use crate::text::{LineRange, SnapshotSpan};

/// A tag payload attached to a span of one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct TagSpan<T> {
    pub span: SnapshotSpan,
    pub tag: T,
}

impl<T> TagSpan<T> {
    pub fn new(span: SnapshotSpan, tag: T) -> Self {
        Self { span, tag }
    }

    pub fn start_line(&self) -> usize {
        self.span.start_line()
    }

    /// Whether the tag starts on one of the lines of `range`
    pub(crate) fn starts_in(&self, range: &LineRange) -> bool {
        range.contains_line(self.start_line())
    }
}
