//! The capability set an [`AsyncTagger`](super::AsyncTagger) consumes.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::TagSourceError;
use crate::text::{Snapshot, SnapshotLineRange, SnapshotSpan};

use super::tag::TagSpan;

/// Read-only view state used to prioritise visible lines.
pub trait TextView: Send + Sync {
    /// True while the host is laying out lines; geometry must not be touched
    fn in_layout(&self) -> bool;

    /// Lines currently on screen, if known
    fn visible_line_range(&self) -> Option<SnapshotLineRange>;
}

/// Supplies tags to an [`AsyncTagger`](super::AsyncTagger).
///
/// Methods documented as foreground-only are called from the thread owning the
/// tagger. [`tags_in_background`](Self::tags_in_background) is called from the
/// tokio blocking pool and must honour the cancellation token.
pub trait AsyncTaggerSource: Send + Sync + 'static {
    /// Context captured on the foreground and handed to background computation
    type Data: Send + Sync + 'static;

    type Tag: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Debounce applied before background work is dispatched
    fn delay(&self) -> Option<Duration> {
        None
    }

    /// View used for visible-line prioritisation and layout detection
    fn text_view(&self) -> Option<&dyn TextView> {
        None
    }

    /// Current snapshot (foreground only)
    fn text_snapshot(&self) -> Snapshot;

    /// Capture what the background computation needs (foreground only)
    fn data_for_snapshot(&self, snapshot: &Snapshot) -> Self::Data;

    /// Compute tags for `span` off the foreground thread.
    ///
    /// Returning an error (or panicking) marks the span as visited with no tags.
    fn tags_in_background(
        &self,
        data: &Self::Data,
        span: &SnapshotSpan,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<TagSpan<Self::Tag>>, TagSourceError>;

    /// Cheap synchronous answer that bypasses caching entirely (foreground only)
    fn try_get_tags_prompt(&self, _span: &SnapshotSpan) -> Option<Vec<TagSpan<Self::Tag>>> {
        None
    }

    /// Subscription to the source's "everything changed" event
    fn changed(&self) -> Option<ChangeSubscription> {
        None
    }
}

/// Event a tag source raises when all previously computed tags are invalid
#[derive(Debug)]
pub struct ChangeEvent {
    generation: watch::Sender<u64>,
}

impl Default for ChangeEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeEvent {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self { generation }
    }

    /// Notify every subscriber
    pub fn raise(&self) {
        self.generation.send_modify(|generation| *generation += 1);
    }

    /// Subscribe; only raises after this call are observed
    pub fn subscribe(&self) -> ChangeSubscription {
        ChangeSubscription {
            generation: self.generation.subscribe(),
        }
    }
}

/// Receiving side of a [`ChangeEvent`]
#[derive(Debug)]
pub struct ChangeSubscription {
    generation: watch::Receiver<u64>,
}

impl ChangeSubscription {
    /// Whether the event was raised since the last call. Several raises in a
    /// row are observed once.
    pub fn take_pending(&mut self) -> bool {
        match self.generation.has_changed() {
            Ok(true) => {
                self.generation.borrow_and_update();
                true
            }
            Ok(false) | Err(_) => false,
        }
    }
}
