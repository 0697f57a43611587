//! Error handling types for the tagger
//!
//! Background computation failures never escape the tagger; these types exist
//! for the tag source contract, configuration loading and lock recovery.

use std::sync::PoisonError;
use thiserror::Error;

/// Error type for tagger setup
#[derive(Debug, Error)]
pub enum TaggerError {
    /// Configuration error
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

/// Result type for tagger operations
pub type TaggerResult<T> = Result<T, TaggerError>;

/// Failure reported by a tag source while computing tags off the foreground thread.
///
/// Both variants are absorbed by the background loop: the line range is still
/// recorded as visited, just without tags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagSourceError {
    /// The cancellation token was observed mid-computation
    #[error("Tag computation cancelled")]
    Cancelled,

    /// The computation itself failed
    #[error("Tag computation failed: {message}")]
    Failed { message: String },
}

impl TagSourceError {
    /// Create a failure error
    pub fn failed(message: impl Into<String>) -> Self {
        TagSourceError::Failed {
            message: message.into(),
        }
    }
}

/// Helper trait to recover the guard from a poisoned lock
pub trait LockResultExt<T> {
    /// Recover the inner guard from a PoisonError, logging the recovery.
    ///
    /// The context parameter identifies which operation triggered lock recovery,
    /// helping developers debug thread safety issues.
    fn recover_poison(self, context: &str) -> T;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    target: "async_tagger::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                poisoned.into_inner()
            }
        }
    }
}

impl TaggerError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        TaggerError::Config {
            message: message.into(),
        }
    }
}
