// mongolink-core/src/error.rs
//! Operation errors surfaced by database, collection and cursor handles

use serde_json::Value;
use thiserror::Error;

use crate::document::Document;

/// Server error codes the handles themselves look at
pub mod codes {
    pub const BAD_VALUE: i32 = 2;
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    pub const CURSOR_NOT_FOUND: i32 = 43;
    pub const NAMESPACE_EXISTS: i32 = 48;
    pub const COMMAND_NOT_FOUND: i32 = 59;
    pub const INVALID_OPTIONS: i32 = 72;
    pub const INVALID_NAMESPACE: i32 = 73;
    pub const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
}

/// The single error category for everything a handle operation can fail with.
///
/// The variant tells the caller *where* it failed (server, network, reply shape,
/// local argument check); the handles never interpret command semantics.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Server answered with `ok: 0`
    #[error("command '{command}' failed with code {code} ({code_name}): {message}")]
    CommandFailed {
        command: String,
        code: i32,
        code_name: String,
        message: String,
    },

    /// Server could not be reached
    #[error("connection error: {0}")]
    Connection(String),

    /// Reply is missing fields the handle depends on
    #[error("malformed server reply: {0}")]
    MalformedReply(String),

    /// Rejected before anything was sent
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OperationError>;

impl OperationError {
    /// Server error code, if the server produced this error
    pub fn code(&self) -> Option<i32> {
        match self {
            OperationError::CommandFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self, OperationError::Connection(_))
    }

    /// Turn a raw command reply into `Ok(reply)` or `CommandFailed`.
    ///
    /// A reply is successful when its `ok` field is a truthy number or `true`.
    /// Replies without `ok` are treated as malformed.
    pub fn from_reply(command: &str, reply: Document) -> Result<Document> {
        let ok = match reply.get("ok") {
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Some(Value::Bool(b)) => *b,
            _ => {
                return Err(OperationError::MalformedReply(format!(
                    "reply to '{}' has no 'ok' field",
                    command
                )))
            }
        };

        if ok {
            return Ok(reply);
        }

        let code = reply
            .get("code")
            .and_then(Value::as_i64)
            .and_then(|code| i32::try_from(code).ok())
            .unwrap_or(0);
        let code_name = reply
            .get("codeName")
            .and_then(Value::as_str)
            .unwrap_or("UnknownError")
            .to_string();
        let message = reply
            .get("errmsg")
            .and_then(Value::as_str)
            .unwrap_or("unknown server error")
            .to_string();

        Err(OperationError::CommandFailed {
            command: command.to_string(),
            code,
            code_name,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_ok_reply_passes_through() {
        let reply = doc! { "ok": 1, "n": 3 };
        let result = OperationError::from_reply("count", reply).unwrap();
        assert_eq!(result.get("n"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_failed_reply_carries_code() {
        let reply = doc! {
            "ok": 0,
            "errmsg": "Collection already exists. NS: app.users",
            "code": 48,
            "codeName": "NamespaceExists"
        };
        let err = OperationError::from_reply("create", reply).unwrap_err();
        assert_eq!(err.code(), Some(codes::NAMESPACE_EXISTS));
        assert!(!err.is_network_error());
        assert!(err.to_string().contains("NamespaceExists"));
    }

    #[test]
    fn test_reply_without_ok_is_malformed() {
        let err = OperationError::from_reply("ping", doc! { "pong": true }).unwrap_err();
        assert!(matches!(err, OperationError::MalformedReply(_)));
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_boolean_ok() {
        assert!(OperationError::from_reply("ping", doc! { "ok": true }).is_ok());
        assert!(OperationError::from_reply("ping", doc! { "ok": false }).is_err());
    }

    #[test]
    fn test_out_of_range_code_is_unknown() {
        let reply = doc! { "ok": 0, "code": 1_i64 << 40, "errmsg": "odd" };
        let err = OperationError::from_reply("ping", reply).unwrap_err();
        assert_eq!(err.code(), Some(0));
    }
}
