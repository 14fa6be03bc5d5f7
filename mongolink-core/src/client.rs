// mongolink-core/src/client.rs
//! Client: entry point that mints database handles

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::database::Database;
use crate::document::{get_array, Document};
use crate::driver::Driver;
use crate::error::{OperationError, Result};
use crate::options::{ClientOptions, ReadPreference, WriteConcern};

/// Connection to a deployment through a [`Driver`]
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use mongolink_core::{Client, MemoryDriver};
///
/// let client = Client::new(Arc::new(MemoryDriver::new()));
/// let db = client.database("app");
/// assert_eq!(db.name(), "app");
/// ```
pub struct Client {
    driver: Arc<dyn Driver>,
    options: ClientOptions,
}

impl Client {
    /// Client with default options
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Client {
            driver,
            options: ClientOptions::default(),
        }
    }

    /// Client with explicit options; fails if they don't validate
    pub fn with_options(driver: Arc<dyn Driver>, options: ClientOptions) -> Result<Self> {
        options.validate()?;
        info!(app_name = ?options.app_name, "client created");
        Ok(Client { driver, options })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Database handle seeded with this client's current settings
    pub fn database(&self, name: &str) -> Database {
        Database::new(self, name)
    }

    pub fn read_preference(&self) -> &ReadPreference {
        &self.options.read_preference
    }

    /// Only databases obtained afterwards see the change
    pub fn set_read_preference(&mut self, read_preference: ReadPreference) {
        self.options.read_preference = read_preference;
    }

    pub fn write_concern(&self) -> &WriteConcern {
        &self.options.write_concern
    }

    /// Only databases obtained afterwards see the change
    pub fn set_write_concern(&mut self, write_concern: WriteConcern) {
        self.options.write_concern = write_concern;
    }

    /// Names of the non-empty databases on the server
    pub fn list_database_names(&self) -> Result<Vec<String>> {
        let mut command = Document::new();
        command.insert("listDatabases".to_string(), Value::from(1));
        command.insert("nameOnly".to_string(), Value::from(true));

        let reply = self.driver.run_command("admin", &command, None)?;
        let databases = get_array(&reply, "databases").ok_or_else(|| {
            OperationError::MalformedReply("listDatabases reply without 'databases'".to_string())
        })?;

        Ok(databases
            .iter()
            .filter_map(|db| db.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").field("options", &self.options).finish()
    }
}
