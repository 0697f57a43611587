pub mod config;
pub mod error;
pub mod tagger;
pub mod text;

pub use config::TaggerSettings;
pub use error::{TagSourceError, TaggerError, TaggerResult};
pub use tagger::{
    AsyncBackgroundRequest, AsyncTagger, AsyncTaggerSource, BackgroundCacheData, ChangeEvent,
    ChangeSubscription, Channel, DEFAULT_CHUNK_COUNT, TagCache, TagSpan, TextView,
    TrackingCacheData,
};
pub use text::{
    LineRange, NormalizedLineRangeCollection, Snapshot, SnapshotLineRange, SnapshotSpan, Span,
    TextBuffer, TextChange, TrackingMode, TrackingSpan,
};
