// mongolink-core/src/options/create_collection.rs
// Options for the `create` command: capped collections, validation, storage

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::error::{OperationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Off,
    Strict,
    Moderate,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Off => "off",
            ValidationLevel::Strict => "strict",
            ValidationLevel::Moderate => "moderate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationAction {
    Error,
    Warn,
}

impl ValidationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationAction::Error => "error",
            ValidationAction::Warn => "warn",
        }
    }
}

/// Options for creating a collection
///
/// Everything is passed through to the server; only combinations the server
/// would reject outright are checked locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateCollectionOptions {
    /// Fixed-size collection that evicts the oldest documents
    pub capped: Option<bool>,

    /// Maximum size in bytes (required when capped)
    pub size: Option<u64>,

    /// Maximum number of documents (capped only)
    pub max: Option<u64>,

    /// Per-engine configuration, e.g. `{"wiredTiger": {...}}`
    pub storage_engine: Option<Document>,

    /// Filter every inserted document must match
    pub validator: Option<Document>,

    pub validation_level: Option<ValidationLevel>,

    pub validation_action: Option<ValidationAction>,

    pub collation: Option<Document>,
}

impl CreateCollectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capped collection of at most `size` bytes
    pub fn with_capped(mut self, size: u64) -> Self {
        self.capped = Some(true);
        self.size = Some(size);
        self
    }

    pub fn with_max(mut self, max: u64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_storage_engine(mut self, storage_engine: Document) -> Self {
        self.storage_engine = Some(storage_engine);
        self
    }

    pub fn with_validator(mut self, validator: Document) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_validation_level(mut self, level: ValidationLevel) -> Self {
        self.validation_level = Some(level);
        self
    }

    pub fn with_validation_action(mut self, action: ValidationAction) -> Self {
        self.validation_action = Some(action);
        self
    }

    pub fn with_collation(mut self, collation: Document) -> Self {
        self.collation = Some(collation);
        self
    }

    pub fn is_capped(&self) -> bool {
        self.capped == Some(true)
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_capped() {
            if self.size.unwrap_or(0) == 0 {
                return Err(OperationError::InvalidArgument(
                    "a capped collection requires a positive size".to_string(),
                ));
            }
        } else if self.size.is_some() || self.max.is_some() {
            return Err(OperationError::InvalidArgument(
                "size and max are only valid for capped collections".to_string(),
            ));
        }
        Ok(())
    }

    /// Write the recognised options into a `create` command
    pub fn append_to(&self, command: &mut Document) {
        if let Some(capped) = self.capped {
            command.insert("capped".to_string(), Value::from(capped));
        }
        if let Some(size) = self.size {
            command.insert("size".to_string(), Value::from(size));
        }
        if let Some(max) = self.max {
            command.insert("max".to_string(), Value::from(max));
        }
        if let Some(engine) = &self.storage_engine {
            command.insert("storageEngine".to_string(), Value::Object(engine.clone()));
        }
        if let Some(validator) = &self.validator {
            command.insert("validator".to_string(), Value::Object(validator.clone()));
        }
        if let Some(level) = self.validation_level {
            command.insert("validationLevel".to_string(), Value::from(level.as_str()));
        }
        if let Some(action) = self.validation_action {
            command.insert("validationAction".to_string(), Value::from(action.as_str()));
        }
        if let Some(collation) = &self.collation {
            command.insert("collation".to_string(), Value::Object(collation.clone()));
        }
    }
}
