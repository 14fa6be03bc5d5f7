// mongolink-core/src/database.rs
//! Database handle
//!
//! A `Database` is minted by a [`Client`] and owns one driver-side resource.
//! It is move-only: ownership of the resource follows the value, and a
//! default-constructed or [`take`](Database::take)n-from handle is *empty*.
//!
//! # Empty handles
//!
//! The only valid things to do with an empty handle are dropping it and
//! assigning a valid handle to it. Every other method panics; this is a
//! precondition violation, not a recoverable error.
//!
//! # Settings
//!
//! Read preference and write concern are copied from the client when the
//! handle is created, and copied again into every [`Collection`] the handle
//! creates. Changing them here never reaches back to the client or to
//! collections created earlier.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::client::Client;
use crate::collection::Collection;
use crate::cursor::Cursor;
use crate::document::{command_name, Document};
use crate::driver::{Driver, ResourceId};
use crate::error::Result;
use crate::options::{CreateCollectionOptions, ReadPreference, WriteConcern};

struct DatabaseState {
    name: String,
    driver: Arc<dyn Driver>,
    resource: ResourceId,
    read_preference: ReadPreference,
    write_concern: WriteConcern,
    list_collections_batch_size: Option<u32>,
}

impl Drop for DatabaseState {
    fn drop(&mut self) {
        self.driver.release_database(self.resource);
    }
}

/// Handle to a server-side database
#[derive(Default)]
pub struct Database {
    state: Option<Box<DatabaseState>>,
}

impl Database {
    /// Only a client builds valid handles
    pub(crate) fn new(client: &Client, name: &str) -> Self {
        let driver = Arc::clone(client.driver());
        let resource = driver.acquire_database(name);
        let options = client.options();

        Database {
            state: Some(Box::new(DatabaseState {
                name: name.to_string(),
                driver,
                resource,
                read_preference: options.read_preference.clone(),
                write_concern: options.write_concern.clone(),
                list_collections_batch_size: options.list_collections_batch_size,
            })),
        }
    }

    #[track_caller]
    fn state(&self) -> &DatabaseState {
        match self.state.as_deref() {
            Some(state) => state,
            None => panic!("operation on an empty database handle"),
        }
    }

    #[track_caller]
    fn state_mut(&mut self) -> &mut DatabaseState {
        match self.state.as_deref_mut() {
            Some(state) => state,
            None => panic!("operation on an empty database handle"),
        }
    }

    /// False for default-constructed and moved-from handles
    pub fn is_valid(&self) -> bool {
        self.state.is_some()
    }

    /// Move the handle out, leaving `self` empty
    ///
    /// For places that must stay usable after the move (struct fields, slots
    /// in a `Vec`). `a = a.take()` leaves `a` unchanged.
    pub fn take(&mut self) -> Database {
        std::mem::take(self)
    }

    /// Driver resource owned by this handle
    pub fn resource(&self) -> ResourceId {
        self.state().resource
    }

    pub fn name(&self) -> &str {
        &self.state().name
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.state().driver
    }

    fn execute(&self, command: Document) -> Result<Document> {
        let state = self.state();
        debug!(
            database = %state.name,
            command = command_name(&command).unwrap_or(""),
            "running database command"
        );
        state.driver.run_command(&state.name, &command, None)
    }

    /// Run an arbitrary command against this database
    ///
    /// The reply is returned untouched; a server-side rejection comes back as
    /// `OperationError::CommandFailed`.
    pub fn run_command(&self, command: &Document) -> Result<Document> {
        self.execute(command.clone())
    }

    /// Explicitly create a collection (`create` command)
    pub fn create_collection(&self, name: &str, options: &CreateCollectionOptions) -> Result<Collection> {
        options.validate()?;

        let mut command = Document::new();
        command.insert("create".to_string(), Value::from(name));
        options.append_to(&mut command);
        self.state().write_concern.append_to(&mut command)?;

        self.execute(command)?;
        Ok(self.collection(name))
    }

    /// Drop the database and every collection in it
    pub fn drop(&self) -> Result<()> {
        let mut command = Document::new();
        command.insert("dropDatabase".to_string(), Value::from(1));
        self.state().write_concern.append_to(&mut command)?;

        self.execute(command)?;
        Ok(())
    }

    /// Ask the server whether a collection named `name` exists
    pub fn has_collection(&self, name: &str) -> Result<bool> {
        let mut filter = Document::new();
        filter.insert("name".to_string(), Value::from(name));

        let mut cursor = self.open_list_collections(Some(filter), true)?;
        match cursor.next() {
            Some(Ok(_)) => Ok(true),
            Some(Err(err)) => Err(err),
            None => Ok(false),
        }
    }

    /// Enumerate collection descriptors matching `filter` (all when `None`)
    pub fn list_collections(&self, filter: Option<Document>) -> Result<Cursor> {
        self.open_list_collections(filter, false)
    }

    /// Names of the collections matching `filter`
    pub fn list_collection_names(&self, filter: Option<Document>) -> Result<Vec<String>> {
        let cursor = self.open_list_collections(filter, true)?;
        let mut names = Vec::new();
        for descriptor in cursor {
            let descriptor = descriptor?;
            if let Some(name) = descriptor.get("name").and_then(Value::as_str) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn open_list_collections(&self, filter: Option<Document>, name_only: bool) -> Result<Cursor> {
        let batch_size = self.state().list_collections_batch_size;

        let mut command = Document::new();
        command.insert("listCollections".to_string(), Value::from(1));
        if let Some(filter) = filter {
            command.insert("filter".to_string(), Value::Object(filter));
        }
        if name_only {
            command.insert("nameOnly".to_string(), Value::from(true));
        }
        let mut cursor_options = Document::new();
        if let Some(batch_size) = batch_size {
            cursor_options.insert("batchSize".to_string(), Value::from(batch_size));
        }
        command.insert("cursor".to_string(), Value::Object(cursor_options));

        let reply = self.execute(command)?;
        Cursor::from_reply(Arc::clone(self.driver()), self.name(), &reply, batch_size)
    }

    /// Server-side statistics (`dbStats`)
    pub fn stats(&self) -> Result<Document> {
        let mut command = Document::new();
        command.insert("dbStats".to_string(), Value::from(1));
        self.execute(command)
    }

    pub fn read_preference(&self) -> &ReadPreference {
        &self.state().read_preference
    }

    /// Applies to collections created from now on
    pub fn set_read_preference(&mut self, read_preference: ReadPreference) {
        self.state_mut().read_preference = read_preference;
    }

    pub fn write_concern(&self) -> &WriteConcern {
        &self.state().write_concern
    }

    /// Applies to collections created from now on and to this handle's own
    /// writing commands
    pub fn set_write_concern(&mut self, write_concern: WriteConcern) {
        self.state_mut().write_concern = write_concern;
    }

    /// Handle to a collection; no round trip, the collection need not exist
    pub fn collection(&self, name: &str) -> Collection {
        let state = self.state();
        Collection::new(
            Arc::clone(&state.driver),
            &state.name,
            name,
            state.read_preference.clone(),
            state.write_concern.clone(),
        )
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.as_deref() {
            Some(state) => f
                .debug_struct("Database")
                .field("name", &state.name)
                .field("resource", &state.resource)
                .field("read_preference", &state.read_preference)
                .field("write_concern", &state.write_concern)
                .finish(),
            None => f.write_str("Database(<empty>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::driver::MemoryDriver;
    use crate::options::ClientOptions;

    fn setup() -> (Arc<MemoryDriver>, Client) {
        let driver = Arc::new(MemoryDriver::new());
        let client = Client::new(driver.clone());
        (driver, client)
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_handles_are_send_sync() {
        assert_send_sync::<Database>();
        assert_send_sync::<Client>();
        assert_send_sync::<Collection>();
    }

    #[test]
    fn test_default_is_empty() {
        let db = Database::default();
        assert!(!db.is_valid());
        assert_eq!(format!("{:?}", db), "Database(<empty>)");
    }

    #[test]
    fn test_resource_released_once() {
        let (driver, client) = setup();
        let db = client.database("app");
        let resource = db.resource();
        assert!(driver.is_live(resource));

        drop(db);
        assert!(!driver.is_live(resource));
        assert_eq!(driver.live_resources(), 0);
    }

    #[test]
    fn test_take_transfers_resource() {
        let (driver, client) = setup();
        let mut a = client.database("app");
        let resource = a.resource();

        let b = a.take();
        assert!(!a.is_valid());
        assert!(b.is_valid());
        assert_eq!(b.name(), "app");
        assert_eq!(b.resource(), resource);
        assert_eq!(driver.live_resources(), 1);

        drop(a);
        assert_eq!(driver.live_resources(), 1);
        drop(b);
        assert_eq!(driver.live_resources(), 0);
    }

    #[test]
    fn test_self_move() {
        let (driver, client) = setup();
        let mut a = client.database("app");
        let resource = a.resource();

        a = a.take();
        assert!(a.is_valid());
        assert_eq!(a.resource(), resource);
        assert_eq!(driver.live_resources(), 1);
    }

    #[test]
    fn test_assign_over_valid_releases_old() {
        let (driver, client) = setup();
        let mut a = client.database("one");
        let old = a.resource();
        let mut b = client.database("two");

        a = b.take();
        assert!(!driver.is_live(old));
        assert_eq!(a.name(), "two");
        assert!(!b.is_valid());
        assert_eq!(driver.live_resources(), 1);
    }

    #[test]
    #[should_panic(expected = "empty database handle")]
    fn test_name_on_empty_panics() {
        let db = Database::default();
        let _ = db.name();
    }

    #[test]
    fn test_seeded_from_client() {
        let driver = Arc::new(MemoryDriver::new());
        let options = ClientOptions::new()
            .with_read_preference(ReadPreference::secondary())
            .with_write_concern(WriteConcern::majority());
        let client = Client::with_options(driver, options).unwrap();

        let db = client.database("app");
        assert_eq!(db.read_preference(), &ReadPreference::secondary());
        assert_eq!(db.write_concern(), &WriteConcern::majority());
    }

    #[test]
    fn test_writing_commands_carry_write_concern() {
        let (driver, client) = setup();
        let mut db = client.database("app");

        db.create_collection("users", &CreateCollectionOptions::new()).unwrap();
        let create = driver.last_command("create").unwrap();
        assert!(!create.command.contains_key("writeConcern"));

        db.set_write_concern(WriteConcern::nodes(2));
        db.drop().unwrap();
        let drop_cmd = driver.last_command("dropDatabase").unwrap();
        assert_eq!(drop_cmd.command.get("writeConcern"), Some(&serde_json::json!({"w": 2})));
    }

    #[test]
    fn test_invalid_write_concern_rejected_locally() {
        let (driver, client) = setup();
        let mut db = client.database("app");
        db.set_write_concern(WriteConcern::unacknowledged().with_journal(true));

        let err = db.drop().unwrap_err();
        assert!(matches!(err, crate::error::OperationError::InvalidArgument(_)));
        assert!(driver.last_command("dropDatabase").is_none());
    }

    #[test]
    fn test_run_command_passes_reply_through() {
        let (driver, client) = setup();
        let db = client.database("app");
        let reply = db.run_command(&doc! { "ping": 1 }).unwrap();
        assert_eq!(reply.get("ok"), Some(&serde_json::json!(1.0)));
        assert_eq!(driver.last_command("ping").unwrap().database, "app");
    }
}
