// mongolink-core/src/options/client.rs
//! Client configuration
//!
//! Loaded from JSON by applications (the CLI reads it via `--options`). Every
//! field has a default, so `{}` is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::{OperationError, Result};
use crate::options::{ReadPreference, WriteConcern};

/// First-batch size the server uses when the command does not set one
pub const DEFAULT_BATCH_SIZE: u32 = 101;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
    /// Reported to the server in the handshake and to logs
    pub app_name: Option<String>,

    /// Default read preference for databases minted by the client
    pub read_preference: ReadPreference,

    /// Default write concern for databases minted by the client
    pub write_concern: WriteConcern,

    /// `cursor.batchSize` sent with `listCollections`; `None` lets the server pick
    pub list_collections_batch_size: Option<u32>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: ClientOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn with_read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = read_preference;
        self
    }

    pub fn with_write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.write_concern = write_concern;
        self
    }

    pub fn with_list_collections_batch_size(mut self, batch_size: u32) -> Self {
        self.list_collections_batch_size = Some(batch_size);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.read_preference.validate()?;
        self.write_concern.validate()?;
        if self.list_collections_batch_size == Some(0) {
            return Err(OperationError::InvalidArgument(
                "listCollectionsBatchSize must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
