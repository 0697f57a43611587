//! The synchronous entry point over the cache and the background request.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::TaggerSettings;
use crate::text::{LineRange, Snapshot, SnapshotSpan};

use super::cache::TagCache;
use super::channel::Channel;
use super::request::{AsyncBackgroundRequest, BackgroundSpawner, ForegroundMessage};
use super::source::{AsyncTaggerSource, ChangeSubscription};
use super::tag::TagSpan;

const LOG_TARGET: &str = "async_tagger::tagger";

/// Answers tag queries synchronously while computing missing tags in the
/// background.
///
/// The tagger belongs to the foreground: every method takes `&mut self` and
/// background results only land when the owner calls
/// [`process_pending`](Self::process_pending) or
/// [`run_until_idle`](Self::run_until_idle).
pub struct AsyncTagger<S: AsyncTaggerSource> {
    source: Arc<S>,
    /// `None` when created outside a tokio runtime; nothing is ever scheduled
    spawner: Option<BackgroundSpawner<S>>,
    chunk_count: usize,
    fallback_delay: Option<Duration>,
    prioritize_visible_lines: bool,
    tag_cache: TagCache<S::Tag>,
    background_request: Option<AsyncBackgroundRequest<S::Data>>,
    cached_overarching_request_span: Option<SnapshotSpan>,
    posts: UnboundedReceiver<ForegroundMessage<S::Tag>>,
    tags_changed: Vec<UnboundedSender<SnapshotSpan>>,
    source_changed: Option<ChangeSubscription>,
    disposed: bool,
}

impl<S: AsyncTaggerSource> AsyncTagger<S> {
    pub fn new(source: S) -> Self {
        Self::with_settings(source, TaggerSettings::default())
    }

    pub fn with_settings(source: S, settings: TaggerSettings) -> Self {
        let source = Arc::new(source);
        let (sender, posts) = mpsc::unbounded_channel();

        let spawner = match Handle::try_current() {
            Ok(runtime) => Some(BackgroundSpawner::new(runtime, Arc::clone(&source), sender)),
            Err(_) => {
                log::warn!(
                    target: LOG_TARGET,
                    "No tokio runtime available; background tagging is disabled"
                );
                None
            }
        };
        let source_changed = source.changed();

        Self {
            source,
            spawner,
            chunk_count: settings.chunk_count.max(1),
            fallback_delay: settings.delay(),
            prioritize_visible_lines: settings.prioritize_visible_lines,
            tag_cache: TagCache::empty(),
            background_request: None,
            cached_overarching_request_span: None,
            posts,
            tags_changed: Vec::new(),
            source_changed,
            disposed: false,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Maximum lines per background iteration; applies to tasks started later
    pub fn set_chunk_count(&mut self, chunk_count: usize) {
        self.chunk_count = chunk_count.max(1);
    }

    pub fn tag_cache(&self) -> &TagCache<S::Tag> {
        &self.tag_cache
    }

    pub fn background_request(&self) -> Option<&AsyncBackgroundRequest<S::Data>> {
        self.background_request.as_ref()
    }

    pub fn cached_overarching_request_span(&self) -> Option<&SnapshotSpan> {
        self.cached_overarching_request_span.as_ref()
    }

    /// Receive the span to refresh whenever previously returned tags changed
    pub fn subscribe_tags_changed(&mut self) -> UnboundedReceiver<SnapshotSpan> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.tags_changed.push(sender);
        receiver
    }

    /// Best available tags for `spans`, in input order. Never blocks.
    ///
    /// Lines not yet computed on the spans' snapshot are queued for the
    /// background; until their results land they are answered from tracking
    /// data when possible and otherwise left out.
    pub fn get_tags(&mut self, spans: &[SnapshotSpan]) -> Vec<TagSpan<S::Tag>> {
        if self.disposed || spans.is_empty() {
            return Vec::new();
        }
        self.observe_source_changed();

        if let Some(view) = self.source.text_view()
            && view.in_layout()
        {
            log::trace!(target: LOG_TARGET, "View is in layout; returning no tags");
            return Vec::new();
        }

        self.adjust_overarching_request_span(spans);

        let prompt: Vec<_> = spans
            .iter()
            .map(|span| self.source.try_get_tags_prompt(span))
            .collect();
        if prompt.iter().any(Option::is_some) {
            return prompt.into_iter().flatten().flatten().collect();
        }

        let mut tags = Vec::new();
        for span in spans {
            tags.extend(self.get_tags_from_cache(span));
        }
        tags
    }

    fn get_tags_from_cache(&mut self, span: &SnapshotSpan) -> Vec<TagSpan<S::Tag>> {
        let snapshot = span.snapshot();
        let owned = snapshot.same_buffer(&self.source.text_snapshot());
        if !owned {
            log::warn!(
                target: LOG_TARGET,
                "Tags requested for a buffer the source does not own: {:?}",
                span
            );
        }
        debug_assert!(owned, "span belongs to another buffer");
        self.tag_cache = std::mem::take(&mut self.tag_cache).advanced_to(snapshot);

        let lookup = self.tag_cache.lookup(span);
        if !lookup.missing.is_empty() {
            self.schedule(snapshot, &lookup.missing);
        }
        lookup.tags
    }

    /// Remember the union of everything asked for on the newest snapshot
    fn adjust_overarching_request_span(&mut self, spans: &[SnapshotSpan]) {
        for span in spans {
            let merged = self
                .cached_overarching_request_span
                .as_ref()
                .and_then(|cached| cached.union(span));
            self.cached_overarching_request_span = Some(merged.unwrap_or_else(|| span.clone()));
        }
    }

    /// Queue `missing` on the live request, creating or replacing it as needed
    fn schedule(&mut self, snapshot: &Snapshot, missing: &[LineRange]) {
        let Some(spawner) = &self.spawner else {
            return;
        };

        if let Some(request) = &self.background_request
            && request.snapshot() == snapshot
        {
            log::debug!(
                target: LOG_TARGET,
                "Appending {:?} to request {}",
                missing,
                request.id()
            );
            self.write_prioritized(request.channel(), snapshot, missing);
            return;
        }

        if let Some(stale) = self.background_request.take() {
            log::debug!(
                target: LOG_TARGET,
                "Request {} for v{} superseded by v{}",
                stale.id(),
                stale.snapshot().version(),
                snapshot.version()
            );
            stale.cancel();
        }

        let channel = Channel::new();
        self.write_prioritized(&channel, snapshot, missing);
        let delay = self.source.delay().or(self.fallback_delay);
        self.background_request =
            Some(spawner.start(snapshot.clone(), channel, self.chunk_count, delay));
    }

    /// Write `missing` into `channel`, visible lines ahead of the rest
    fn write_prioritized(&self, channel: &Channel, snapshot: &Snapshot, missing: &[LineRange]) {
        let visible = self
            .prioritize_visible_lines
            .then(|| self.source.text_view())
            .flatten()
            .and_then(|view| view.visible_line_range())
            .filter(|visible| visible.snapshot() == snapshot)
            .map(|visible| visible.line_range());

        for range in missing {
            let Some(visible) = visible else {
                channel.write_normal(*range);
                continue;
            };
            match range.intersect(&visible) {
                Some(shown) => {
                    channel.write_normal(*range);
                    channel.write_visible_lines(shown);
                }
                None => channel.write_normal(*range),
            }
        }
    }

    /// Handle every result the background has posted so far. Never blocks.
    ///
    /// Returns the number of posts handled.
    pub fn process_pending(&mut self) -> usize {
        self.observe_source_changed();

        let mut handled = 0;
        while let Ok(message) = self.posts.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    /// Handle posts until no background request is live
    pub async fn run_until_idle(&mut self) {
        loop {
            self.process_pending();
            if self.disposed || self.spawner.is_none() || self.background_request.is_none() {
                return;
            }
            match self.posts.recv().await {
                Some(message) => self.handle_message(message),
                None => return,
            }
        }
    }

    /// Wait for the current background task to run to completion without
    /// handling anything it posted
    pub async fn wait_for_background_task(&mut self) {
        let Some(task) = self
            .background_request
            .as_mut()
            .and_then(AsyncBackgroundRequest::take_task)
        else {
            return;
        };
        if let Err(error) = task.await {
            log::warn!(target: LOG_TARGET, "Background task ended abnormally: {}", error);
        }
    }

    fn is_current_request(&self, request_id: u64) -> bool {
        self.background_request
            .as_ref()
            .is_some_and(|request| request.id() == request_id)
    }

    fn handle_message(&mut self, message: ForegroundMessage<S::Tag>) {
        if self.disposed {
            return;
        }

        match message {
            ForegroundMessage::Progress {
                request_id,
                line_range,
                tags,
            } => {
                if !self.is_current_request(request_id) {
                    log::trace!(
                        target: LOG_TARGET,
                        "Discarding results of superseded request {}",
                        request_id
                    );
                    return;
                }

                let (tag_cache, changed) = std::mem::take(&mut self.tag_cache)
                    .with_background_results(&line_range, tags);
                self.tag_cache = tag_cache;

                if changed {
                    self.raise_tags_changed();
                } else {
                    log::trace!(
                        target: LOG_TARGET,
                        "Tracking data predicted {:?}; no refresh needed",
                        line_range.line_range()
                    );
                }
            }
            ForegroundMessage::Completed { request_id } => {
                if !self.is_current_request(request_id) {
                    return;
                }

                let has_unfinished_work = self
                    .background_request
                    .as_ref()
                    .is_some_and(|request| !request.channel().is_empty());
                let chunk_count = self.chunk_count;
                let restarted = match (&self.spawner, self.background_request.as_mut()) {
                    (Some(spawner), Some(request)) if has_unfinished_work => {
                        spawner.restart(request, chunk_count);
                        true
                    }
                    _ => false,
                };
                if !restarted {
                    log::debug!(target: LOG_TARGET, "Request {} complete", request_id);
                    self.background_request = None;
                }
            }
        }
    }

    fn raise_tags_changed(&mut self) {
        let Some(span) = &self.cached_overarching_request_span else {
            return;
        };
        self.tags_changed
            .retain(|subscriber| subscriber.send(span.clone()).is_ok());
    }

    fn observe_source_changed(&mut self) {
        let raised = self
            .source_changed
            .as_mut()
            .is_some_and(ChangeSubscription::take_pending);
        if raised {
            self.on_source_changed();
        }
    }

    /// Drop everything computed so far after the source invalidated it.
    ///
    /// Consumers are told to refresh only if they have asked for tags before.
    pub fn on_source_changed(&mut self) {
        if self.disposed {
            return;
        }
        log::debug!(target: LOG_TARGET, "Source changed; clearing tag cache");

        self.tag_cache = TagCache::empty();
        if let Some(request) = self.background_request.take() {
            request.cancel();
        }
        self.raise_tags_changed();
    }

    /// Cancel any live request and stop answering queries
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(request) = self.background_request.take() {
            request.cancel();
        }
        self.tag_cache = TagCache::empty();
        self.tags_changed.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl<S: AsyncTaggerSource> Drop for AsyncTagger<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
