//! Tagger configuration.
//!
//! Settings are read as partial layers (every field optional) so a user layer
//! can be merged over a fallback layer before being resolved against defaults.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{TaggerError, TaggerResult};
use crate::tagger::DEFAULT_CHUNK_COUNT;

/// Resolved tagger settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggerSettings {
    /// Maximum number of lines computed per background iteration
    pub chunk_count: usize,
    /// Debounce applied before dispatching background work, when the source has none
    pub delay_ms: Option<u64>,
    /// Compute visible lines before the rest of a request
    pub prioritize_visible_lines: bool,
}

impl Default for TaggerSettings {
    fn default() -> Self {
        Self {
            chunk_count: DEFAULT_CHUNK_COUNT,
            delay_ms: None,
            prioritize_visible_lines: true,
        }
    }
}

impl TaggerSettings {
    /// Parse a TOML document and resolve it against the defaults
    pub fn from_toml_str(source: &str) -> TaggerResult<Self> {
        let layer: PartialTaggerSettings =
            toml::from_str(source).map_err(|e| TaggerError::config(e.to_string()))?;
        layer.resolve()
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> TaggerResult<()> {
        if self.chunk_count == 0 {
            return Err(TaggerError::config("chunk_count must be greater than zero"));
        }
        Ok(())
    }
}

/// One layer of settings as written by a user; unset fields fall through
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialTaggerSettings {
    pub chunk_count: Option<usize>,
    pub delay_ms: Option<u64>,
    pub prioritize_visible_lines: Option<bool>,
}

impl PartialTaggerSettings {
    /// Fill unset fields from the defaults and validate the result
    pub fn resolve(self) -> TaggerResult<TaggerSettings> {
        let defaults = TaggerSettings::default();
        let settings = TaggerSettings {
            chunk_count: self.chunk_count.unwrap_or(defaults.chunk_count),
            delay_ms: self.delay_ms.or(defaults.delay_ms),
            prioritize_visible_lines: self
                .prioritize_visible_lines
                .unwrap_or(defaults.prioritize_visible_lines),
        };
        settings.validate()?;
        log::debug!(
            target: "async_tagger::config",
            "Resolved tagger settings: {:?}",
            settings
        );
        Ok(settings)
    }
}

/// Merge two settings layers, preferring values from `primary` over `fallback`
pub fn merge_settings(
    fallback: Option<PartialTaggerSettings>,
    primary: Option<PartialTaggerSettings>,
) -> Option<PartialTaggerSettings> {
    match (fallback, primary) {
        (None, None) => None,
        (Some(settings), None) => Some(settings),
        (None, Some(settings)) => Some(settings),
        (Some(fallback), Some(primary)) => Some(PartialTaggerSettings {
            chunk_count: primary.chunk_count.or(fallback.chunk_count),
            delay_ms: primary.delay_ms.or(fallback.delay_ms),
            prioritize_visible_lines: primary
                .prioritize_visible_lines
                .or(fallback.prioritize_visible_lines),
        }),
    }
}
