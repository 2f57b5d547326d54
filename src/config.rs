//! Construction configuration.

use serde::{Deserialize, Serialize};

use crate::codec::{JsonCodec, SnapshotCodec, XmlCodec};

/// Snapshot text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// XML document.
    Xml,
}

impl CodecKind {
    /// Parse `json` or `xml`, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }

    /// Instantiate the codec.
    pub fn build(&self) -> Box<dyn SnapshotCodec> {
        match self {
            Self::Json => Box::new(JsonCodec),
            Self::Xml => Box::new(XmlCodec),
        }
    }
}

/// Tunables of a construction.
///
/// Defaults:
/// - undo enabled with 100 entries
/// - undo info stored after every successful mutation
/// - 256 cached parsed definitions
/// - macros nested at most 16 deep
/// - JSON snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructionConfig {
    /// Whether undo points are recorded at all.
    pub undo_enabled: bool,
    /// Maximum number of undo entries kept (default: 100).
    pub max_undo_depth: usize,
    /// Store undo info automatically after each successful mutation.
    pub auto_store_undo: bool,
    /// Capacity of the parse cache (default: 256).
    pub parse_cache_capacity: usize,
    /// Maximum macro nesting depth (default: 16).
    pub max_macro_depth: usize,
    /// Snapshot text format.
    pub codec: CodecKind,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        Self {
            undo_enabled: true,
            max_undo_depth: 100,
            auto_store_undo: true,
            parse_cache_capacity: 256,
            max_macro_depth: 16,
            codec: CodecKind::Json,
        }
    }
}

impl ConstructionConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Reads `CONSTRUCTION_UNDO_DEPTH`, `CONSTRUCTION_UNDO` (`on`/`off`) and
    /// `CONSTRUCTION_CODEC` (`json`/`xml`).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            max_undo_depth: lookup("CONSTRUCTION_UNDO_DEPTH")
                .and_then(|s| s.trim().parse().ok())
                .filter(|depth: &usize| *depth > 0)
                .unwrap_or(defaults.max_undo_depth),
            undo_enabled: lookup("CONSTRUCTION_UNDO")
                .and_then(|s| match s.trim().to_ascii_lowercase().as_str() {
                    "on" | "true" | "1" => Some(true),
                    "off" | "false" | "0" => Some(false),
                    _ => None,
                })
                .unwrap_or(defaults.undo_enabled),
            codec: lookup("CONSTRUCTION_CODEC")
                .and_then(|s| CodecKind::parse(&s))
                .unwrap_or(defaults.codec),
            ..defaults
        }
    }
}
