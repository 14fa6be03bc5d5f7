// mongolink-core/src/options/mod.rs
//! Settings and option types shared by the handles

pub mod client;
pub mod create_collection;
pub mod read_preference;
pub mod write_concern;

pub use client::{ClientOptions, DEFAULT_BATCH_SIZE};
pub use create_collection::{CreateCollectionOptions, ValidationAction, ValidationLevel};
pub use read_preference::{ReadMode, ReadPreference};
pub use write_concern::{Acknowledgment, WriteConcern};
