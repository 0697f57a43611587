//! In-flight background computation for one snapshot.
//!
//! # Lifecycle
//!
//! ```text
//! no request ──get_tags(missing)──► start ──► task drains Channel, computes chunks
//!                                     │             │
//!      same snapshot: write Channel ◄─┤             ├─► Progress posts (per chunk)
//!      new snapshot: cancel, replace ◄┘             └─► Completed post
//!                                                          │
//!      Completed + Channel non-empty ──► restart task ◄────┤
//!      Completed + Channel empty     ──► retire request ◄──┘
//! ```
//!
//! The task posts `Completed` only after a drain came back empty. Anything
//! the foreground writes after that drain is found by the foreground itself
//! when it handles `Completed`, so appended work is never stranded.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::TagSourceError;
use crate::text::{NormalizedLineRangeCollection, Snapshot, SnapshotLineRange};

use super::channel::Channel;
use super::source::AsyncTaggerSource;
use super::tag::TagSpan;

const LOG_TARGET: &str = "async_tagger::background";

/// Monotonically increasing request ID for tracking
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generates a unique request ID
fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// Posted from a background task to the foreground queue, in completion order
#[derive(Debug)]
pub(crate) enum ForegroundMessage<T> {
    Progress {
        request_id: u64,
        line_range: SnapshotLineRange,
        tags: Vec<TagSpan<T>>,
    },
    Completed {
        request_id: u64,
    },
}

/// The live background computation of an [`AsyncTagger`](super::AsyncTagger).
///
/// At most one exists per tagger. It is keyed to exactly one snapshot; work for
/// that snapshot is appended through its [`Channel`], work for any other
/// snapshot replaces it.
pub struct AsyncBackgroundRequest<D> {
    id: u64,
    snapshot: Snapshot,
    channel: Channel,
    cancellation_token: CancellationToken,
    data: Arc<D>,
    task: Option<JoinHandle<()>>,
}

impl<D> AsyncBackgroundRequest<D> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Whether the current background task has run to completion
    pub fn is_task_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub(crate) fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub(crate) fn take_task(&mut self) -> Option<JoinHandle<()>> {
        self.task.take()
    }
}

impl<D> fmt::Debug for AsyncBackgroundRequest<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncBackgroundRequest")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot)
            .field("pending", &self.channel.pending())
            .field("cancelled", &self.cancellation_token.is_cancelled())
            .finish()
    }
}

/// Spawns background tasks for one tagger onto a tokio runtime
pub(crate) struct BackgroundSpawner<S: AsyncTaggerSource> {
    runtime: Handle,
    source: Arc<S>,
    sender: UnboundedSender<ForegroundMessage<S::Tag>>,
}

impl<S: AsyncTaggerSource> BackgroundSpawner<S> {
    pub(crate) fn new(
        runtime: Handle,
        source: Arc<S>,
        sender: UnboundedSender<ForegroundMessage<S::Tag>>,
    ) -> Self {
        Self {
            runtime,
            source,
            sender,
        }
    }

    /// Create a request for `snapshot` whose task starts draining `channel`
    /// after the optional delay.
    pub(crate) fn start(
        &self,
        snapshot: Snapshot,
        channel: Channel,
        chunk_count: usize,
        delay: Option<Duration>,
    ) -> AsyncBackgroundRequest<S::Data> {
        let id = next_request_id();
        let data = Arc::new(self.source.data_for_snapshot(&snapshot));
        let mut request = AsyncBackgroundRequest {
            id,
            snapshot,
            channel,
            cancellation_token: CancellationToken::new(),
            data,
            task: None,
        };

        log::debug!(
            target: LOG_TARGET,
            "Starting request {} for v{} with {:?}",
            id,
            request.snapshot.version(),
            request.channel.pending()
        );
        request.task = Some(self.spawn(&request, chunk_count, delay));
        request
    }

    /// Run a fresh task over the request's remaining channel contents
    pub(crate) fn restart(&self, request: &mut AsyncBackgroundRequest<S::Data>, chunk_count: usize) {
        log::debug!(
            target: LOG_TARGET,
            "Restarting request {} for unfinished work {:?}",
            request.id,
            request.channel.pending()
        );
        request.task = Some(self.spawn(request, chunk_count, None));
    }

    fn spawn(
        &self,
        request: &AsyncBackgroundRequest<S::Data>,
        chunk_count: usize,
        delay: Option<Duration>,
    ) -> JoinHandle<()> {
        let job = BackgroundJob {
            request_id: request.id,
            source: Arc::clone(&self.source),
            data: Arc::clone(&request.data),
            snapshot: request.snapshot.clone(),
            channel: request.channel.clone(),
            cancellation_token: request.cancellation_token.clone(),
            chunk_count: chunk_count.max(1),
            delay,
            sender: self.sender.clone(),
        };
        self.runtime.spawn(job.run())
    }
}

struct BackgroundJob<S: AsyncTaggerSource> {
    request_id: u64,
    source: Arc<S>,
    data: Arc<S::Data>,
    snapshot: Snapshot,
    channel: Channel,
    cancellation_token: CancellationToken,
    chunk_count: usize,
    delay: Option<Duration>,
    sender: UnboundedSender<ForegroundMessage<S::Tag>>,
}

impl<S: AsyncTaggerSource> BackgroundJob<S> {
    async fn run(self) {
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    log::trace!(
                        target: LOG_TARGET,
                        "Request {} cancelled during its {:?} delay",
                        self.request_id,
                        delay
                    );
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // Lines this task already computed; the foreground only learns about
        // them once it processes the posts
        let mut visited = NormalizedLineRangeCollection::new();

        loop {
            let pending = self.channel.drain();
            if pending.is_empty() {
                break;
            }

            for range in pending {
                for gap in visited.missing(&range) {
                    for chunk in gap.split(self.chunk_count) {
                        if self.cancellation_token.is_cancelled() {
                            log::debug!(
                                target: LOG_TARGET,
                                "Request {} cancelled, abandoning remaining work",
                                self.request_id
                            );
                            return;
                        }

                        let line_range = SnapshotLineRange::new(self.snapshot.clone(), chunk);
                        let tags = self.compute(&line_range).await;
                        visited.add(line_range.line_range());

                        log::trace!(
                            target: LOG_TARGET,
                            "Request {} finished {:?} with {} tag(s)",
                            self.request_id,
                            line_range.line_range(),
                            tags.len()
                        );
                        let progress = ForegroundMessage::Progress {
                            request_id: self.request_id,
                            line_range,
                            tags,
                        };
                        if self.sender.send(progress).is_err() {
                            log::debug!(
                                target: LOG_TARGET,
                                "Foreground queue closed, stopping request {}",
                                self.request_id
                            );
                            return;
                        }
                    }
                }
            }
        }

        let _ = self.sender.send(ForegroundMessage::Completed {
            request_id: self.request_id,
        });
    }

    /// Run the source's computation on the blocking pool. Failures, panics
    /// and cancellation all yield no tags.
    async fn compute(&self, line_range: &SnapshotLineRange) -> Vec<TagSpan<S::Tag>> {
        let source = Arc::clone(&self.source);
        let data = Arc::clone(&self.data);
        let token = self.cancellation_token.clone();
        let span = line_range.extent_including_line_break();

        let result =
            tokio::task::spawn_blocking(move || source.tags_in_background(&data, &span, &token))
                .await;

        match result {
            Ok(Ok(tags)) => tags,
            Ok(Err(TagSourceError::Cancelled)) => {
                log::debug!(
                    target: LOG_TARGET,
                    "Computation for {:?} cancelled",
                    line_range.line_range()
                );
                Vec::new()
            }
            Ok(Err(error)) => {
                log::warn!(
                    target: LOG_TARGET,
                    "Computation for {:?} failed: {}",
                    line_range.line_range(),
                    error
                );
                Vec::new()
            }
            Err(join_error) => {
                log::warn!(
                    target: LOG_TARGET,
                    "Computation for {:?} did not finish: {}",
                    line_range.line_range(),
                    join_error
                );
                Vec::new()
            }
        }
    }
}
