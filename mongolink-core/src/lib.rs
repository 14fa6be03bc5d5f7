// mongolink-core/src/lib.rs
// Database handle layer over a pluggable driver

pub mod client;
pub mod collection;
pub mod cursor;
pub mod database;
pub mod document;
pub mod driver;
pub mod error;
pub mod options;

#[doc(hidden)]
pub use serde_json as __serde_json;

// Public exports
pub use client::Client;
pub use collection::Collection;
pub use cursor::Cursor;
pub use database::Database;
pub use document::Document;
pub use driver::{CommandEvent, Driver, FailPoint, MemoryDriver, ResourceId};
pub use error::{OperationError, Result};
pub use options::{
    Acknowledgment, ClientOptions, CreateCollectionOptions, ReadMode, ReadPreference,
    ValidationAction, ValidationLevel, WriteConcern,
};
