// mongolink-core/src/options/write_concern.rs
//! Write concern: how many members must acknowledge a write

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::error::{OperationError, Result};

/// The `w` field
///
/// Serialized the way the server expects it: a number, `"majority"`, or a
/// custom tag name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub enum Acknowledgment {
    Nodes(u32),
    Majority,
    Tag(String),
}

impl From<Acknowledgment> for Value {
    fn from(ack: Acknowledgment) -> Self {
        match ack {
            Acknowledgment::Nodes(n) => Value::from(n),
            Acknowledgment::Majority => Value::from("majority"),
            Acknowledgment::Tag(tag) => Value::from(tag),
        }
    }
}

impl TryFrom<Value> for Acknowledgment {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Acknowledgment::Nodes)
                .ok_or_else(|| format!("invalid w value: {}", n)),
            Value::String(s) if s == "majority" => Ok(Acknowledgment::Majority),
            Value::String(s) => Ok(Acknowledgment::Tag(s)),
            other => Err(format!("invalid w value: {}", other)),
        }
    }
}

/// Write concern value type
///
/// All fields `None` means "server default": nothing is appended to commands.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WriteConcern {
    pub w: Option<Acknowledgment>,
    pub journal: Option<bool>,
    pub w_timeout_ms: Option<u64>,
}

impl WriteConcern {
    pub fn majority() -> Self {
        WriteConcern {
            w: Some(Acknowledgment::Majority),
            ..Default::default()
        }
    }

    pub fn nodes(n: u32) -> Self {
        WriteConcern {
            w: Some(Acknowledgment::Nodes(n)),
            ..Default::default()
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        WriteConcern {
            w: Some(Acknowledgment::Tag(tag.into())),
            ..Default::default()
        }
    }

    /// w:0, fire and forget
    pub fn unacknowledged() -> Self {
        Self::nodes(0)
    }

    pub fn with_journal(mut self, journal: bool) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.w_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn is_server_default(&self) -> bool {
        self.w.is_none() && self.journal.is_none() && self.w_timeout_ms.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.w == Some(Acknowledgment::Nodes(0)) && self.journal == Some(true) {
            return Err(OperationError::InvalidArgument(
                "write concern w:0 cannot request journaling".to_string(),
            ));
        }
        Ok(())
    }

    /// Wire form: `{w?, j?, wtimeout?}`
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        if let Some(w) = &self.w {
            doc.insert("w".to_string(), Value::from(w.clone()));
        }
        if let Some(journal) = self.journal {
            doc.insert("j".to_string(), Value::from(journal));
        }
        if let Some(timeout) = self.w_timeout_ms {
            doc.insert("wtimeout".to_string(), Value::from(timeout));
        }
        doc
    }

    /// Validate and attach as `writeConcern` unless this is the server default
    pub(crate) fn append_to(&self, command: &mut Document) -> Result<()> {
        self.validate()?;
        if !self.is_server_default() {
            command.insert("writeConcern".to_string(), Value::Object(self.to_document()));
        }
        Ok(())
    }
}
