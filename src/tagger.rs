//! Asynchronous tagging engine.
//!
//! [`AsyncTagger`] answers "which tags apply to these spans" synchronously for
//! an editor's rendering path, while the real computation runs off the
//! foreground thread and the text keeps changing underneath it.
//!
//! ## Architecture
//!
//! ```text
//!   get_tags(spans)                     background task (tokio)
//!        │                                       │
//!        ├─► prompt tags? ── yes ──► return      │
//!        │                                       │
//!        ├─► TagCache (background + tracking)    │
//!        │        │                              │
//!        │        └─ missing lines ──► Channel ──┼─► drain, chunk, compute
//!        │                                       │
//!        └─► best-effort tags                    └─► ForegroundMessage
//!                                                         │
//!   process_pending() / run_until_idle() ◄────────────────┘
//!        │
//!        └─► merge into TagCache, raise TagsChanged if the answer moved
//! ```
//!
//! All `AsyncTagger` state is owned by the foreground. The [`Channel`] is the
//! only structure touched from both sides.

mod async_tagger;
mod cache;
mod channel;
mod request;
mod source;
mod tag;

pub use async_tagger::AsyncTagger;
pub use cache::{BackgroundCacheData, CacheLookup, TagCache, TrackingCacheData};
pub use channel::Channel;
pub use request::AsyncBackgroundRequest;
pub use source::{AsyncTaggerSource, ChangeEvent, ChangeSubscription, TextView};
pub use tag::TagSpan;

/// Default maximum number of lines computed per background iteration
pub const DEFAULT_CHUNK_COUNT: usize = 500;
