//! Scriptable tag source and view for driving `AsyncTagger` in tests.
//!
//! By default the source tags every occurrence of "cat" and "dog" in the
//! background and offers no prompt tags, view or delay.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_tagger::{
    AsyncTaggerSource, ChangeEvent, ChangeSubscription, LineRange, Snapshot, SnapshotLineRange,
    SnapshotSpan, TagSourceError, TagSpan, TextBuffer, TextView,
};
use tokio_util::sync::CancellationToken;

use super::test_fixtures::word_tags;

pub type BackgroundFn = dyn Fn(&Snapshot, &SnapshotSpan, &CancellationToken) -> Result<Vec<TagSpan<String>>, TagSourceError>
    + Send
    + Sync;

pub type PromptFn = dyn Fn(&SnapshotSpan) -> Option<Vec<TagSpan<String>>> + Send + Sync;

/// View whose layout flag and visible lines tests can change at will
#[derive(Default)]
pub struct MockView {
    in_layout: AtomicBool,
    visible: Mutex<Option<SnapshotLineRange>>,
}

impl MockView {
    pub fn set_in_layout(&self, in_layout: bool) {
        self.in_layout.store(in_layout, Ordering::SeqCst);
    }

    pub fn set_visible(&self, visible: Option<SnapshotLineRange>) {
        *self.visible.lock().unwrap() = visible;
    }
}

impl TextView for MockView {
    fn in_layout(&self) -> bool {
        self.in_layout.load(Ordering::SeqCst)
    }

    fn visible_line_range(&self) -> Option<SnapshotLineRange> {
        self.visible.lock().unwrap().clone()
    }
}

pub struct MockSource {
    buffer: TextBuffer,
    words: Vec<String>,
    prompt: Option<Box<PromptFn>>,
    background: Option<Box<BackgroundFn>>,
    view: Option<Arc<MockView>>,
    delay: Option<Duration>,
    changed: Arc<ChangeEvent>,
    calls: Arc<Mutex<Vec<LineRange>>>,
    data_requests: Arc<AtomicUsize>,
}

impl MockSource {
    pub fn new(buffer: TextBuffer) -> Self {
        Self {
            buffer,
            words: vec!["cat".to_string(), "dog".to_string()],
            prompt: None,
            background: None,
            view: None,
            delay: None,
            changed: Arc::new(ChangeEvent::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
            data_requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_words(mut self, words: &[&str]) -> Self {
        self.words = words.iter().map(|word| word.to_string()).collect();
        self
    }

    pub fn with_prompt(
        mut self,
        prompt: impl Fn(&SnapshotSpan) -> Option<Vec<TagSpan<String>>> + Send + Sync + 'static,
    ) -> Self {
        self.prompt = Some(Box::new(prompt));
        self
    }

    pub fn with_background(
        mut self,
        background: impl Fn(&Snapshot, &SnapshotSpan, &CancellationToken) -> Result<Vec<TagSpan<String>>, TagSourceError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.background = Some(Box::new(background));
        self
    }

    pub fn with_view(mut self, view: Arc<MockView>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    /// Handle for raising the source's change event
    pub fn changed_event(&self) -> Arc<ChangeEvent> {
        Arc::clone(&self.changed)
    }

    /// Line ranges the background computation was called with, in call order
    pub fn calls(&self) -> Arc<Mutex<Vec<LineRange>>> {
        Arc::clone(&self.calls)
    }

    pub fn data_requests(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.data_requests)
    }
}

impl AsyncTaggerSource for MockSource {
    type Data = Snapshot;
    type Tag = String;

    fn delay(&self) -> Option<Duration> {
        self.delay
    }

    fn text_view(&self) -> Option<&dyn TextView> {
        self.view.as_deref().map(|view| view as &dyn TextView)
    }

    fn text_snapshot(&self) -> Snapshot {
        self.buffer.current_snapshot()
    }

    fn data_for_snapshot(&self, snapshot: &Snapshot) -> Snapshot {
        self.data_requests.fetch_add(1, Ordering::SeqCst);
        snapshot.clone()
    }

    fn tags_in_background(
        &self,
        data: &Snapshot,
        span: &SnapshotSpan,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<TagSpan<String>>, TagSourceError> {
        self.calls
            .lock()
            .unwrap()
            .push(span.line_range().line_range());

        match &self.background {
            Some(background) => background(data, span, cancellation_token),
            None => Ok(word_tags(data, span, &self.words)),
        }
    }

    fn try_get_tags_prompt(&self, span: &SnapshotSpan) -> Option<Vec<TagSpan<String>>> {
        self.prompt.as_ref().and_then(|prompt| prompt(span))
    }

    fn changed(&self) -> Option<ChangeSubscription> {
        Some(self.changed.subscribe())
    }
}
