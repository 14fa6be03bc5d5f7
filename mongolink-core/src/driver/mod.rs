// mongolink-core/src/driver/mod.rs
//! Driver abstraction
//!
//! The handles never talk to a server directly. Everything goes through the
//! [`Driver`] trait, which offers the three things a database handle needs:
//!
//! ```text
//! Driver trait
//!   ├── acquire_database / release_database   (per-handle resource)
//!   └── run_command                           (one document in, one out)
//!
//! Implementations
//!   └── MemoryDriver (in-process server: tests, CLI, fixtures)
//! ```
//!
//! Transport, BSON, server selection and retries live behind an implementation
//! of this trait.

pub mod filter;
pub mod memory;

use std::fmt;

use crate::document::Document;
use crate::error::Result;
use crate::options::ReadPreference;

pub use memory::{CommandEvent, FailPoint, MemoryDriver};

/// Driver-side resource owned by exactly one database handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn new(raw: u64) -> Self {
        ResourceId(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Minimal interface to the underlying driver
pub trait Driver: Send + Sync {
    /// Allocate the per-database state a handle owns
    fn acquire_database(&self, name: &str) -> ResourceId;

    /// Free state previously returned by `acquire_database`
    ///
    /// Called exactly once per resource, when the owning handle is dropped.
    fn release_database(&self, id: ResourceId);

    /// Execute one command against `database`
    ///
    /// Returns the reply only when the server reports success; an `ok: 0`
    /// reply must come back as `OperationError::CommandFailed`.
    /// `read_preference` of `None` means primary.
    fn run_command(
        &self,
        database: &str,
        command: &Document,
        read_preference: Option<&ReadPreference>,
    ) -> Result<Document>;
}
