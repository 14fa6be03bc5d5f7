// mongolink-core/src/cursor.rs
//! Server-side cursor as a lazy, single-pass iterator
//!
//! Holds the current batch locally and asks the server for the next one
//! (`getMore`) only when the local batch runs dry. Dropping a cursor that the
//! server still keeps open sends `killCursors`.

use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::document::{get_array, get_document, get_i64, get_str, Document};
use crate::driver::Driver;
use crate::error::{OperationError, Result};

pub struct Cursor {
    driver: Arc<dyn Driver>,
    database: String,
    collection: String,
    id: i64,
    buffer: VecDeque<Document>,
    batch_size: Option<u32>,
    // Set once a getMore failed; the server may still hold the cursor
    failed: bool,
}

impl Cursor {
    /// Build a cursor from a `{cursor: {id, ns, firstBatch}}` reply
    ///
    /// A reply that carries a live cursor id but is otherwise unusable still
    /// gets that cursor killed before the error is returned.
    pub(crate) fn from_reply(
        driver: Arc<dyn Driver>,
        database: &str,
        reply: &Document,
        batch_size: Option<u32>,
    ) -> Result<Self> {
        let cursor = get_document(reply, "cursor")
            .ok_or_else(|| OperationError::MalformedReply("missing cursor".to_string()))?;
        let id = get_i64(cursor, "id")
            .ok_or_else(|| OperationError::MalformedReply("missing cursor.id".to_string()))?;

        let parsed = parse_namespace(cursor).and_then(|collection| {
            let first_batch = get_array(cursor, "firstBatch").ok_or_else(|| {
                OperationError::MalformedReply("missing cursor.firstBatch".to_string())
            })?;
            Ok((collection, to_documents(first_batch)?))
        });
        let (collection, buffer) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                if id != 0 {
                    let namespace = get_str(cursor, "ns").unwrap_or_default();
                    kill_server_cursor(driver.as_ref(), database, namespace, id);
                }
                return Err(err);
            }
        };
        trace!(cursor = id, collection = %collection, batch = buffer.len(), "cursor opened");

        Ok(Cursor {
            driver,
            database: database.to_string(),
            collection,
            id,
            buffer,
            batch_size,
            failed: false,
        })
    }

    /// Server cursor id; 0 once the server has nothing more
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    /// Documents fetched but not yet yielded
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.buffer.is_empty() && (self.id == 0 || self.failed)
    }

    fn get_more(&mut self) -> Result<()> {
        let mut command = Document::new();
        command.insert("getMore".to_string(), Value::from(self.id));
        command.insert("collection".to_string(), Value::from(self.collection.clone()));
        if let Some(batch_size) = self.batch_size {
            command.insert("batchSize".to_string(), Value::from(batch_size));
        }

        let reply = self.driver.run_command(&self.database, &command, None)?;
        let id = get_i64(&reply, "cursor.id")
            .ok_or_else(|| OperationError::MalformedReply("missing cursor.id".to_string()))?;
        let next_batch = get_array(&reply, "cursor.nextBatch")
            .ok_or_else(|| OperationError::MalformedReply("missing cursor.nextBatch".to_string()))?;

        self.buffer = to_documents(next_batch)?;
        trace!(cursor = self.id, batch = self.buffer.len(), "fetched next batch");
        self.id = id;
        Ok(())
    }
}

/// "app.$cmd.listCollections" -> "$cmd.listCollections"
fn parse_namespace(cursor: &Document) -> Result<String> {
    let namespace = get_str(cursor, "ns")
        .ok_or_else(|| OperationError::MalformedReply("missing cursor.ns".to_string()))?;
    namespace
        .split_once('.')
        .map(|(_, coll)| coll.to_string())
        .ok_or_else(|| OperationError::MalformedReply(format!("invalid cursor namespace '{}'", namespace)))
}

fn to_documents(batch: &[Value]) -> Result<VecDeque<Document>> {
    batch
        .iter()
        .map(|value| {
            value.as_object().cloned().ok_or_else(|| {
                OperationError::MalformedReply("cursor batch entries must be documents".to_string())
            })
        })
        .collect()
}

/// Best effort; failures are only logged
fn kill_server_cursor(driver: &dyn Driver, database: &str, collection: &str, id: i64) {
    let mut command = Document::new();
    command.insert("killCursors".to_string(), Value::from(collection));
    command.insert("cursors".to_string(), Value::Array(vec![Value::from(id)]));

    if let Err(err) = driver.run_command(database, &command, None) {
        warn!(cursor = id, error = %err, "failed to kill cursor");
    }
}

impl Iterator for Cursor {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.buffer.pop_front() {
                return Some(Ok(doc));
            }
            if self.id == 0 || self.failed {
                return None;
            }
            if let Err(err) = self.get_more() {
                self.failed = true;
                // A server-side rejection means the server already discarded the cursor
                if matches!(err, OperationError::CommandFailed { .. }) {
                    self.id = 0;
                }
                return Some(Err(err));
            }
        }
    }
}

impl FusedIterator for Cursor {}

impl Drop for Cursor {
    fn drop(&mut self) {
        if self.id != 0 {
            kill_server_cursor(self.driver.as_ref(), &self.database, &self.collection, self.id);
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("namespace", &self.namespace())
            .field("id", &self.id)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::driver::{FailPoint, MemoryDriver};

    fn driver_with(names: &[&str]) -> Arc<MemoryDriver> {
        let driver = Arc::new(MemoryDriver::new());
        for name in names {
            driver.run_command("app", &doc! { "create": *name }, None).unwrap();
        }
        driver
    }

    fn open(driver: &Arc<MemoryDriver>, batch_size: u32) -> Cursor {
        let reply = driver
            .run_command(
                "app",
                &doc! { "listCollections": 1, "nameOnly": true, "cursor": { "batchSize": batch_size } },
                None,
            )
            .unwrap();
        Cursor::from_reply(driver.clone(), "app", &reply, Some(batch_size)).unwrap()
    }

    #[test]
    fn test_iterates_across_batches() {
        let driver = driver_with(&["a", "b", "c", "d", "e"]);
        let cursor = open(&driver, 2);
        assert_eq!(cursor.namespace(), "app.$cmd.listCollections");
        assert_eq!(cursor.buffered(), 2);

        let names: Vec<String> = cursor
            .map(|doc| doc.unwrap()["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(driver.open_cursors(), 0);
        assert_eq!(
            driver.commands().iter().filter(|c| c.command_name() == "getMore").count(),
            2
        );
    }

    #[test]
    fn test_exhausted_cursor_yields_nothing_more() {
        let driver = driver_with(&["a", "b", "c"]);
        let mut cursor = open(&driver, 1);
        assert_eq!(cursor.by_ref().count(), 3);
        assert!(cursor.is_exhausted());
        assert!(cursor.next().is_none());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_drop_kills_open_cursor() {
        let driver = driver_with(&["a", "b", "c"]);
        {
            let mut cursor = open(&driver, 1);
            assert!(cursor.next().unwrap().is_ok());
            assert_eq!(driver.open_cursors(), 1);
        }
        assert_eq!(driver.open_cursors(), 0);
        assert!(driver.last_command("killCursors").is_some());
    }

    #[test]
    fn test_get_more_failure_surfaces_at_iteration() {
        let driver = driver_with(&["a", "b", "c"]);
        let mut cursor = open(&driver, 1);
        driver.fail_command("getMore", FailPoint::new(43, "CursorNotFound", "gone"));

        assert!(cursor.next().unwrap().is_ok());
        let err = cursor.next().unwrap().unwrap_err();
        assert_eq!(err.code(), Some(43));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_network_failure_still_kills_cursor_on_drop() {
        let driver = driver_with(&["a", "b", "c"]);
        let mut cursor = open(&driver, 1);
        assert!(cursor.next().unwrap().is_ok());

        driver.set_unreachable(true);
        let err = cursor.next().unwrap().unwrap_err();
        assert!(err.is_network_error());
        assert!(cursor.next().is_none());
        assert!(cursor.is_exhausted());
        driver.set_unreachable(false);

        assert_eq!(driver.open_cursors(), 1);
        drop(cursor);
        assert_eq!(driver.open_cursors(), 0);
    }

    #[test]
    fn test_unusable_reply_kills_live_cursor() {
        let driver = driver_with(&["a", "b", "c"]);
        let mut reply = driver
            .run_command("app", &doc! { "listCollections": 1, "cursor": { "batchSize": 1 } }, None)
            .unwrap();
        assert_eq!(driver.open_cursors(), 1);

        reply["cursor"]["ns"] = Value::from("nodot");
        let err = Cursor::from_reply(driver.clone(), "app", &reply, Some(1)).unwrap_err();
        assert!(matches!(err, OperationError::MalformedReply(_)));
        assert_eq!(driver.open_cursors(), 0);
    }

    #[test]
    fn test_malformed_reply() {
        let driver: Arc<dyn Driver> = Arc::new(MemoryDriver::new());
        let err = Cursor::from_reply(driver.clone(), "app", &doc! { "ok": 1 }, None).unwrap_err();
        assert!(matches!(err, OperationError::MalformedReply(_)));

        let reply = doc! { "cursor": { "id": 0, "ns": "nodot", "firstBatch": [] } };
        assert!(Cursor::from_reply(driver.clone(), "app", &reply, None).is_err());

        let reply = doc! { "cursor": { "id": 0, "ns": "app.x", "firstBatch": [1] } };
        assert!(Cursor::from_reply(driver, "app", &reply, None).is_err());
    }
}
