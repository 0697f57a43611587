//! Thread-safe queue of line ranges awaiting background computation.
//!
//! The foreground writes into the channel of the live request; the background
//! task drains it. A write can never be lost to a concurrent drain: both take
//! the same lock, so a write either lands before the drain (and is returned by
//! it) or after it (and is seen by the next drain).

use std::sync::{Arc, Mutex};

use crate::error::LockResultExt;
use crate::text::LineRange;

const LOG_TARGET: &str = "async_tagger::channel";

#[derive(Debug, Default)]
struct PendingRanges {
    /// Visible lines, always read first
    visible: Option<LineRange>,
    /// Stack of ordinary requests; the most recent is read first
    normal: Vec<LineRange>,
}

impl PendingRanges {
    fn covers(&self, range: &LineRange) -> bool {
        self.visible.is_some_and(|visible| visible.contains(range))
            || self.normal.iter().any(|pending| pending.contains(range))
    }
}

/// Pending line ranges shared between a request and its background task.
///
/// Cheaply cloneable via `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Channel {
    pending: Arc<Mutex<PendingRanges>>,
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `range`. Ranges already covered by pending work are skipped and
    /// pending ranges covered by `range` are replaced by it.
    pub fn write_normal(&self, range: LineRange) {
        if range.is_empty() {
            return;
        }

        let mut pending = self.pending.lock().recover_poison("Channel::write_normal");
        if pending.covers(&range) {
            log::trace!(target: LOG_TARGET, "{:?} already pending", range);
            return;
        }
        pending.normal.retain(|existing| !range.contains(existing));
        pending.normal.push(range);
    }

    /// Queue `range` ahead of everything else. A previously queued visible
    /// range is demoted to ordinary work rather than dropped.
    pub fn write_visible_lines(&self, range: LineRange) {
        if range.is_empty() {
            return;
        }

        let mut pending = self
            .pending
            .lock()
            .recover_poison("Channel::write_visible_lines");
        pending.normal.retain(|existing| !range.contains(existing));
        if let Some(previous) = pending.visible.replace(range)
            && !range.contains(&previous)
        {
            pending.normal.push(previous);
        }
    }

    /// Take the next range: visible lines first, then the newest ordinary range
    pub fn read(&self) -> Option<LineRange> {
        let mut pending = self.pending.lock().recover_poison("Channel::read");
        pending.visible.take().or_else(|| pending.normal.pop())
    }

    /// Take everything queued, in read order
    pub fn drain(&self) -> Vec<LineRange> {
        let mut pending = self.pending.lock().recover_poison("Channel::drain");
        let mut drained = Vec::with_capacity(pending.normal.len() + 1);
        drained.extend(pending.visible.take());
        while let Some(range) = pending.normal.pop() {
            drained.push(range);
        }
        drained
    }

    /// Everything queued, in read order, without removing it
    pub fn pending(&self) -> Vec<LineRange> {
        let pending = self.pending.lock().recover_poison("Channel::pending");
        pending
            .visible
            .iter()
            .chain(pending.normal.iter().rev())
            .copied()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        let pending = self.pending.lock().recover_poison("Channel::pending_count");
        pending.normal.len() + usize::from(pending.visible.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }
}
