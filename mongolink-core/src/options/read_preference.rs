// mongolink-core/src/options/read_preference.rs
//! Read preference: which members of a replica set may serve a read

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::error::{OperationError, Result};

/// Smallest max-staleness the server accepts, in seconds
pub const MIN_MAX_STALENESS_SECONDS: u64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadMode {
    /// Only the primary (default)
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

impl ReadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadMode::Primary => "primary",
            ReadMode::PrimaryPreferred => "primaryPreferred",
            ReadMode::Secondary => "secondary",
            ReadMode::SecondaryPreferred => "secondaryPreferred",
            ReadMode::Nearest => "nearest",
        }
    }

    /// Parse a mode name (case-insensitive)
    pub fn parse(s: &str) -> Option<ReadMode> {
        match s.to_ascii_lowercase().as_str() {
            "primary" => Some(ReadMode::Primary),
            "primarypreferred" => Some(ReadMode::PrimaryPreferred),
            "secondary" => Some(ReadMode::Secondary),
            "secondarypreferred" => Some(ReadMode::SecondaryPreferred),
            "nearest" => Some(ReadMode::Nearest),
            _ => None,
        }
    }
}

/// Read preference value type
///
/// Copied, never shared: every handle holds its own instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadPreference {
    pub mode: ReadMode,

    /// Tag sets tried in order; an empty document matches any member
    pub tag_sets: Vec<Document>,

    pub max_staleness_seconds: Option<u64>,
}

impl ReadPreference {
    pub fn new(mode: ReadMode) -> Self {
        ReadPreference {
            mode,
            ..Default::default()
        }
    }

    pub fn primary() -> Self {
        Self::new(ReadMode::Primary)
    }

    pub fn primary_preferred() -> Self {
        Self::new(ReadMode::PrimaryPreferred)
    }

    pub fn secondary() -> Self {
        Self::new(ReadMode::Secondary)
    }

    pub fn secondary_preferred() -> Self {
        Self::new(ReadMode::SecondaryPreferred)
    }

    pub fn nearest() -> Self {
        Self::new(ReadMode::Nearest)
    }

    pub fn with_tag_sets(mut self, tag_sets: Vec<Document>) -> Self {
        self.tag_sets = tag_sets;
        self
    }

    pub fn with_max_staleness_seconds(mut self, seconds: u64) -> Self {
        self.max_staleness_seconds = Some(seconds);
        self
    }

    /// Check the combination of mode, tags and staleness
    pub fn validate(&self) -> Result<()> {
        if self.mode == ReadMode::Primary {
            if !self.tag_sets.is_empty() {
                return Err(OperationError::InvalidArgument(
                    "read preference mode 'primary' cannot be combined with tag sets".to_string(),
                ));
            }
            if self.max_staleness_seconds.is_some() {
                return Err(OperationError::InvalidArgument(
                    "read preference mode 'primary' cannot be combined with maxStalenessSeconds"
                        .to_string(),
                ));
            }
        }

        if let Some(seconds) = self.max_staleness_seconds {
            if seconds < MIN_MAX_STALENESS_SECONDS {
                return Err(OperationError::InvalidArgument(format!(
                    "maxStalenessSeconds must be at least {}, got {}",
                    MIN_MAX_STALENESS_SECONDS, seconds
                )));
            }
        }

        Ok(())
    }

    /// Wire form: `{mode, tags?, maxStalenessSeconds?}`
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("mode".to_string(), Value::from(self.mode.as_str()));
        if !self.tag_sets.is_empty() {
            let tags = self.tag_sets.iter().cloned().map(Value::Object).collect();
            doc.insert("tags".to_string(), Value::Array(tags));
        }
        if let Some(seconds) = self.max_staleness_seconds {
            doc.insert("maxStalenessSeconds".to_string(), Value::from(seconds));
        }
        doc
    }
}
