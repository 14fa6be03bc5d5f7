// mongolink-core/src/collection.rs
// Collection handle: the part of collection behavior a database needs to hand out

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::document::{command_name, get_i64, Document};
use crate::driver::Driver;
use crate::error::{codes, OperationError, Result};
use crate::options::{ReadPreference, WriteConcern};

/// Handle to a collection
///
/// Cheap to create and clone; it holds its own copy of the read preference
/// and write concern it was created with.
#[derive(Clone)]
pub struct Collection {
    driver: Arc<dyn Driver>,
    database: String,
    name: String,
    read_preference: ReadPreference,
    write_concern: WriteConcern,
}

impl Collection {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        database: &str,
        name: &str,
        read_preference: ReadPreference,
        write_concern: WriteConcern,
    ) -> Self {
        Collection {
            driver,
            database: database.to_string(),
            name: name.to_string(),
            read_preference,
            write_concern,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// "<database>.<collection>"
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    pub fn read_preference(&self) -> &ReadPreference {
        &self.read_preference
    }

    pub fn set_read_preference(&mut self, read_preference: ReadPreference) {
        self.read_preference = read_preference;
    }

    pub fn write_concern(&self) -> &WriteConcern {
        &self.write_concern
    }

    pub fn set_write_concern(&mut self, write_concern: WriteConcern) {
        self.write_concern = write_concern;
    }

    fn execute(&self, command: Document, read_preference: Option<&ReadPreference>) -> Result<Document> {
        debug!(
            namespace = %self.namespace(),
            command = command_name(&command).unwrap_or(""),
            "running collection command"
        );
        self.driver.run_command(&self.database, &command, read_preference)
    }

    /// Insert one document, returning its `_id`
    ///
    /// A missing `_id` is generated client-side and placed first.
    pub fn insert_one(&self, document: Document) -> Result<Value> {
        let mut stored = Document::new();
        let id = document
            .get("_id")
            .cloned()
            .unwrap_or_else(|| Value::from(Uuid::new_v4().simple().to_string()));
        stored.insert("_id".to_string(), id.clone());
        stored.extend(document.into_iter().filter(|(key, _)| key != "_id"));

        let mut command = Document::new();
        command.insert("insert".to_string(), Value::from(self.name.as_str()));
        command.insert("documents".to_string(), Value::Array(vec![Value::Object(stored)]));
        self.write_concern.append_to(&mut command)?;

        self.execute(command, None)?;
        Ok(id)
    }

    /// Number of documents matching `filter` (all when `None`)
    ///
    /// Routed with this collection's read preference.
    pub fn count_documents(&self, filter: Option<Document>) -> Result<u64> {
        self.read_preference.validate()?;

        let mut command = Document::new();
        command.insert("count".to_string(), Value::from(self.name.as_str()));
        if let Some(filter) = filter {
            command.insert("query".to_string(), Value::Object(filter));
        }

        let reply = self.execute(command, Some(&self.read_preference))?;
        get_i64(&reply, "n")
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| OperationError::MalformedReply("count reply without 'n'".to_string()))
    }

    pub fn estimated_document_count(&self) -> Result<u64> {
        self.count_documents(None)
    }

    /// Drop the collection; dropping one that does not exist is not an error
    pub fn drop(&self) -> Result<()> {
        let mut command = Document::new();
        command.insert("drop".to_string(), Value::from(self.name.as_str()));
        self.write_concern.append_to(&mut command)?;

        match self.execute(command, None) {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some(codes::NAMESPACE_NOT_FOUND) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("namespace", &self.namespace())
            .field("read_preference", &self.read_preference)
            .field("write_concern", &self.write_concern)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::driver::MemoryDriver;
    use crate::options::ReadMode;

    fn collection(driver: &Arc<MemoryDriver>) -> Collection {
        Collection::new(
            driver.clone(),
            "app",
            "people",
            ReadPreference::default(),
            WriteConcern::default(),
        )
    }

    #[test]
    fn test_names() {
        let driver = Arc::new(MemoryDriver::new());
        let coll = collection(&driver);
        assert_eq!(coll.name(), "people");
        assert_eq!(coll.database_name(), "app");
        assert_eq!(coll.namespace(), "app.people");
    }

    #[test]
    fn test_insert_and_count() {
        let driver = Arc::new(MemoryDriver::new());
        let coll = collection(&driver);

        let generated = coll.insert_one(doc! { "name": "Ann" }).unwrap();
        assert!(generated.is_string());
        assert_eq!(coll.insert_one(doc! { "name": "Bo", "_id": 7 }).unwrap(), serde_json::json!(7));

        let sent = driver.last_command("insert").unwrap();
        let first_key = sent.command["documents"][0].as_object().unwrap().keys().next().cloned();
        assert_eq!(first_key.as_deref(), Some("_id"));

        assert_eq!(coll.estimated_document_count().unwrap(), 2);
        assert_eq!(coll.count_documents(Some(doc! { "name": "Bo" })).unwrap(), 1);
    }

    #[test]
    fn test_count_uses_read_preference() {
        let driver = Arc::new(MemoryDriver::new());
        let mut coll = collection(&driver);
        coll.set_read_preference(ReadPreference::nearest());

        coll.estimated_document_count().unwrap();
        let event = driver.last_command("count").unwrap();
        assert_eq!(event.read_preference.map(|rp| rp.mode), Some(ReadMode::Nearest));
    }

    #[test]
    fn test_count_rejects_invalid_read_preference() {
        let driver = Arc::new(MemoryDriver::new());
        let mut coll = collection(&driver);
        coll.set_read_preference(ReadPreference::primary().with_max_staleness_seconds(120));

        assert!(coll.estimated_document_count().is_err());
        assert!(driver.last_command("count").is_none());
    }

    #[test]
    fn test_drop_missing_is_ok() {
        let driver = Arc::new(MemoryDriver::new());
        let coll = collection(&driver);
        coll.drop().unwrap();

        coll.insert_one(doc! { "a": 1 }).unwrap();
        coll.drop().unwrap();
        assert_eq!(coll.estimated_document_count().unwrap(), 0);
    }

    #[test]
    fn test_write_concern_attached() {
        let driver = Arc::new(MemoryDriver::new());
        let mut coll = collection(&driver);
        coll.set_write_concern(WriteConcern::majority().with_journal(true));

        coll.insert_one(doc! { "a": 1 }).unwrap();
        let sent = driver.last_command("insert").unwrap();
        assert_eq!(
            sent.command.get("writeConcern"),
            Some(&serde_json::json!({ "w": "majority", "j": true }))
        );
    }
}
