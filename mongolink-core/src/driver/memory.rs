// mongolink-core/src/driver/memory.rs
//! In-process server implementing the `Driver` trait
//!
//! Answers the commands the handles issue with MongoDB-shaped replies, so the
//! handles can be exercised end to end without a network. Also the backend of
//! the CLI, which persists its state to a JSON file.
//!
//! # Architecture
//!
//! ```text
//! MemoryDriver
//!   ├── state:     databases -> collections -> {uuid, options, documents}
//!   ├── cursors:   cursor id -> remaining batch queue
//!   ├── resources: live database-handle resources
//!   └── test hooks: command log, fail points, unreachable switch
//! ```

use ahash::AHashMap;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::document::{command_name, get_path, Document};
use crate::driver::filter::matches_filter;
use crate::driver::{Driver, ResourceId};
use crate::error::{codes, OperationError, Result};
use crate::options::{ReadPreference, DEFAULT_BATCH_SIZE};

const UNAUTHORIZED: i32 = 13;
const DUPLICATE_KEY: i32 = 11000;

/// Forced failure for the next command(s) with a given name
#[derive(Debug, Clone, PartialEq)]
pub struct FailPoint {
    pub code: i32,
    pub code_name: String,
    pub message: String,
    /// `None` fails forever, `Some(n)` fails the next `n` invocations
    pub times: Option<u32>,
}

impl FailPoint {
    pub fn new(code: i32, code_name: impl Into<String>, message: impl Into<String>) -> Self {
        FailPoint {
            code,
            code_name: code_name.into(),
            message: message.into(),
            times: None,
        }
    }

    pub fn times(mut self, times: u32) -> Self {
        self.times = Some(times);
        self
    }
}

/// One command as received by the server
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEvent {
    pub database: String,
    pub command: Document,
    pub read_preference: Option<ReadPreference>,
}

impl CommandEvent {
    pub fn command_name(&self) -> &str {
        command_name(&self.command).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ServerState {
    #[serde(default)]
    databases: BTreeMap<String, DatabaseState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DatabaseState {
    #[serde(default)]
    collections: BTreeMap<String, CollectionState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionState {
    uuid: Uuid,
    #[serde(default)]
    options: Document,
    #[serde(default)]
    documents: Vec<Document>,
}

impl CollectionState {
    fn new(options: Document) -> Self {
        CollectionState {
            uuid: Uuid::new_v4(),
            options,
            documents: Vec::new(),
        }
    }

    fn data_size(&self) -> u64 {
        self.documents.iter().map(document_size).sum()
    }
}

struct OpenCursor {
    namespace: String,
    remaining: VecDeque<Document>,
}

/// Server-side failure, rendered as an `ok: 0` reply
#[derive(Debug)]
struct ServerError {
    code: i32,
    code_name: &'static str,
    message: String,
}

impl ServerError {
    fn new(code: i32, code_name: &'static str, message: impl Into<String>) -> Self {
        ServerError {
            code,
            code_name,
            message: message.into(),
        }
    }

    fn bad_value(message: impl Into<String>) -> Self {
        Self::new(codes::BAD_VALUE, "BadValue", message)
    }

    fn into_reply(self) -> Document {
        let mut reply = Document::new();
        reply.insert("ok".to_string(), json!(0.0));
        reply.insert("errmsg".to_string(), json!(self.message));
        reply.insert("code".to_string(), json!(self.code));
        reply.insert("codeName".to_string(), json!(self.code_name));
        reply
    }
}

type ServerResult = std::result::Result<Document, ServerError>;

fn ok_reply(mut reply: Document) -> ServerResult {
    reply.insert("ok".to_string(), json!(1.0));
    Ok(reply)
}

fn document_size(doc: &Document) -> u64 {
    serde_json::to_vec(doc).map(|bytes| bytes.len() as u64).unwrap_or(0)
}

fn validate_database_name(name: &str) -> std::result::Result<(), ServerError> {
    if name.is_empty() || name.chars().any(|c| "/\\. \"$\0".contains(c)) {
        return Err(ServerError::new(
            codes::INVALID_NAMESPACE,
            "InvalidNamespace",
            format!("Invalid database name: '{}'", name),
        ));
    }
    Ok(())
}

fn validate_collection_name(name: &str) -> std::result::Result<(), ServerError> {
    if name.is_empty() || name.contains('$') || name.contains('\0') || name.starts_with('.') {
        return Err(ServerError::new(
            codes::INVALID_NAMESPACE,
            "InvalidNamespace",
            format!("Invalid collection name: '{}'", name),
        ));
    }
    Ok(())
}

/// Collection name carried as the command's value, e.g. `{"create": "users"}`
fn target_collection<'a>(command: &'a Document, name: &str) -> std::result::Result<&'a str, ServerError> {
    let collection = command
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ServerError::bad_value(format!("'{}' must name a collection", name)))?;
    validate_collection_name(collection)?;
    Ok(collection)
}

fn optional_filter(command: &Document, field: &str) -> std::result::Result<Document, ServerError> {
    match command.get(field) {
        None | Some(Value::Null) => Ok(Document::new()),
        Some(Value::Object(filter)) => Ok(filter.clone()),
        Some(_) => Err(ServerError::bad_value(format!("'{}' must be a document", field))),
    }
}

fn optional_batch_size(command: &Document, path: &str) -> std::result::Result<Option<usize>, ServerError> {
    match get_path(command, path) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| ServerError::bad_value("batchSize must be a non-negative integer")),
    }
}

/// Check an insert batch against the target collection (absent if not created
/// yet) and return the documents to store, `_id` first
fn prepare_batch(
    database: &str,
    name: &str,
    existing: Option<&CollectionState>,
    raw: &[Value],
) -> std::result::Result<Vec<Document>, ServerError> {
    let options = existing.map(|c| &c.options);
    let validator = options.and_then(|o| o.get("validator")).and_then(Value::as_object);
    let level = options.and_then(|o| o.get("validationLevel")).and_then(Value::as_str);
    let action = options.and_then(|o| o.get("validationAction")).and_then(Value::as_str);
    let enforce = validator.is_some() && level != Some("off") && action != Some("warn");

    let mut prepared: Vec<Document> = Vec::with_capacity(raw.len());
    for value in raw {
        let fields = value
            .as_object()
            .ok_or_else(|| ServerError::bad_value("inserted documents must be objects"))?;

        let mut doc = Document::new();
        let id = fields
            .get("_id")
            .cloned()
            .unwrap_or_else(|| json!(Uuid::new_v4().simple().to_string()));
        doc.insert("_id".to_string(), id.clone());
        for (key, value) in fields {
            if key != "_id" {
                doc.insert(key.clone(), value.clone());
            }
        }

        let stored = existing.map(|c| c.documents.as_slice()).unwrap_or(&[]);
        let duplicate = stored.iter().any(|d| d.get("_id") == Some(&id))
            || prepared.iter().any(|d| d.get("_id") == Some(&id));
        if duplicate {
            return Err(ServerError::new(
                DUPLICATE_KEY,
                "DuplicateKey",
                format!(
                    "E11000 duplicate key error collection: {}.{} index: _id_ dup key: {{ _id: {} }}",
                    database, name, id
                ),
            ));
        }

        if let Some(validator) = validator.filter(|_| enforce) {
            if !matches_filter(&doc, validator).map_err(ServerError::bad_value)? {
                return Err(ServerError::new(
                    codes::DOCUMENT_VALIDATION_FAILURE,
                    "DocumentValidationFailure",
                    "Document failed validation",
                ));
            }
        }
        prepared.push(doc);
    }
    Ok(prepared)
}

/// In-memory server
pub struct MemoryDriver {
    state: Mutex<ServerState>,
    cursors: Mutex<AHashMap<i64, OpenCursor>>,
    next_cursor_id: AtomicI64,
    resources: DashMap<ResourceId, String>,
    next_resource_id: AtomicU64,
    fail_points: Mutex<AHashMap<String, FailPoint>>,
    unreachable: AtomicBool,
    command_log: Mutex<Vec<CommandEvent>>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    /// Create an empty server
    pub fn new() -> Self {
        Self::with_state(ServerState::default())
    }

    fn with_state(state: ServerState) -> Self {
        MemoryDriver {
            state: Mutex::new(state),
            cursors: Mutex::new(AHashMap::new()),
            next_cursor_id: AtomicI64::new(1),
            resources: DashMap::new(),
            next_resource_id: AtomicU64::new(1),
            fail_points: Mutex::new(AHashMap::new()),
            unreachable: AtomicBool::new(false),
            command_log: Mutex::new(Vec::new()),
        }
    }

    /// Load server state from a JSON file; a missing file yields an empty server
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "state file missing, starting empty");
            return Ok(Self::new());
        }

        let bytes = std::fs::read(path).map_err(|e| {
            OperationError::Connection(format!("cannot read state file {}: {}", path.display(), e))
        })?;
        let state: ServerState = serde_json::from_slice(&bytes)?;
        Ok(Self::with_state(state))
    }

    /// Persist databases, collections, options and documents as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = {
            let state = self.state.lock();
            serde_json::to_vec_pretty(&*state)?
        };
        std::fs::write(path, bytes).map_err(|e| {
            OperationError::Connection(format!("cannot write state file {}: {}", path.display(), e))
        })
    }

    // ========================================================================
    // TEST HOOKS
    // ========================================================================

    /// Number of database resources acquired and not yet released
    pub fn live_resources(&self) -> usize {
        self.resources.len()
    }

    pub fn is_live(&self, id: ResourceId) -> bool {
        self.resources.contains_key(&id)
    }

    /// Server-side cursors still open
    pub fn open_cursors(&self) -> usize {
        self.cursors.lock().len()
    }

    /// Every command received so far, in order
    pub fn commands(&self) -> Vec<CommandEvent> {
        self.command_log.lock().clone()
    }

    /// Most recent command with the given name
    pub fn last_command(&self, name: &str) -> Option<CommandEvent> {
        self.command_log
            .lock()
            .iter()
            .rev()
            .find(|event| event.command_name() == name)
            .cloned()
    }

    pub fn clear_commands(&self) {
        self.command_log.lock().clear();
    }

    /// Make commands named `command` fail with the given server error
    pub fn fail_command(&self, command: &str, fail_point: FailPoint) {
        self.fail_points.lock().insert(command.to_string(), fail_point);
    }

    pub fn clear_fail_points(&self) {
        self.fail_points.lock().clear();
    }

    /// Simulate a network partition: every command fails with a connection error
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn take_fail_point(&self, command: &str) -> Option<FailPoint> {
        let mut fail_points = self.fail_points.lock();
        let fail_point = fail_points.get_mut(command)?;

        let triggered = fail_point.clone();
        match triggered.times {
            Some(n) if n <= 1 => {
                fail_points.remove(command);
            }
            Some(n) => fail_point.times = Some(n - 1),
            None => {}
        }
        Some(triggered)
    }

    // ========================================================================
    // COMMAND DISPATCH
    // ========================================================================

    fn dispatch(&self, database: &str, name: &str, command: &Document) -> ServerResult {
        validate_database_name(database)?;

        match name {
            "ping" => ok_reply(Document::new()),
            "listDatabases" => self.list_databases(database, command),
            "create" => self.create(database, command),
            "drop" => self.drop_collection(database, command),
            "dropDatabase" => self.drop_database(database),
            "listCollections" => self.list_collections(database, command),
            "getMore" => self.get_more(database, command),
            "killCursors" => self.kill_cursors(command),
            "dbStats" => self.db_stats(database, command),
            "insert" => self.insert(database, command),
            "count" => self.count(database, command),
            other => Err(ServerError::new(
                codes::COMMAND_NOT_FOUND,
                "CommandNotFound",
                format!("no such command: '{}'", other),
            )),
        }
    }

    fn list_databases(&self, database: &str, command: &Document) -> ServerResult {
        if database != "admin" {
            return Err(ServerError::new(
                UNAUTHORIZED,
                "Unauthorized",
                "listDatabases may only be run against the admin database.",
            ));
        }
        let name_only = command.get("nameOnly").and_then(Value::as_bool).unwrap_or(false);

        let state = self.state.lock();
        let mut total_size = 0u64;
        let databases: Vec<Value> = state
            .databases
            .iter()
            .filter(|(_, db)| !db.collections.is_empty())
            .map(|(name, db)| {
                let size: u64 = db.collections.values().map(CollectionState::data_size).sum();
                total_size += size;
                if name_only {
                    json!({ "name": name })
                } else {
                    json!({ "name": name, "sizeOnDisk": size, "empty": false })
                }
            })
            .collect();

        let mut reply = Document::new();
        reply.insert("databases".to_string(), Value::Array(databases));
        if !name_only {
            reply.insert("totalSize".to_string(), json!(total_size));
        }
        ok_reply(reply)
    }

    fn create(&self, database: &str, command: &Document) -> ServerResult {
        let name = target_collection(command, "create")?;

        let options: Document = command
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "create" | "writeConcern"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let capped = options.get("capped").and_then(Value::as_bool).unwrap_or(false);
        if capped && options.get("size").and_then(Value::as_u64).unwrap_or(0) == 0 {
            return Err(ServerError::new(
                codes::INVALID_OPTIONS,
                "InvalidOptions",
                "the 'size' field is required when 'capped' is true",
            ));
        }
        if let Some(validator) = options.get("validator") {
            if !validator.is_object() {
                return Err(ServerError::bad_value("'validator' must be a document"));
            }
        }

        let mut state = self.state.lock();
        let db = state.databases.entry(database.to_string()).or_default();
        if db.collections.contains_key(name) {
            return Err(ServerError::new(
                codes::NAMESPACE_EXISTS,
                "NamespaceExists",
                format!("Collection already exists. NS: {}.{}", database, name),
            ));
        }
        db.collections.insert(name.to_string(), CollectionState::new(options));
        ok_reply(Document::new())
    }

    fn drop_collection(&self, database: &str, command: &Document) -> ServerResult {
        let name = target_collection(command, "drop")?;

        let mut state = self.state.lock();
        let removed = match state.databases.get_mut(database) {
            Some(db) => {
                let removed = db.collections.remove(name);
                if db.collections.is_empty() {
                    state.databases.remove(database);
                }
                removed
            }
            None => None,
        };

        match removed {
            Some(_) => {
                let mut reply = Document::new();
                reply.insert("nIndexesWas".to_string(), json!(1));
                reply.insert("ns".to_string(), json!(format!("{}.{}", database, name)));
                ok_reply(reply)
            }
            None => Err(ServerError::new(
                codes::NAMESPACE_NOT_FOUND,
                "NamespaceNotFound",
                "ns not found",
            )),
        }
    }

    fn drop_database(&self, database: &str) -> ServerResult {
        self.state.lock().databases.remove(database);

        let prefix = format!("{}.", database);
        self.cursors
            .lock()
            .retain(|_, cursor| !cursor.namespace.starts_with(&prefix));

        let mut reply = Document::new();
        reply.insert("dropped".to_string(), json!(database));
        ok_reply(reply)
    }

    fn list_collections(&self, database: &str, command: &Document) -> ServerResult {
        let filter = optional_filter(command, "filter")?;
        let name_only = command.get("nameOnly").and_then(Value::as_bool).unwrap_or(false);
        let batch_size = optional_batch_size(command, "cursor.batchSize")?;

        let mut descriptors = Vec::new();
        {
            let state = self.state.lock();
            if let Some(db) = state.databases.get(database) {
                for (name, collection) in &db.collections {
                    let descriptor = json!({
                        "name": name,
                        "type": "collection",
                        "options": collection.options,
                        "info": { "readOnly": false, "uuid": collection.uuid.to_string() },
                        "idIndex": { "v": 2, "key": { "_id": 1 }, "name": "_id_" }
                    });
                    let descriptor = match descriptor {
                        Value::Object(map) => map,
                        _ => continue,
                    };

                    if !matches_filter(&descriptor, &filter).map_err(ServerError::bad_value)? {
                        continue;
                    }

                    if name_only {
                        let mut short = Document::new();
                        short.insert("name".to_string(), json!(name));
                        short.insert("type".to_string(), json!("collection"));
                        descriptors.push(short);
                    } else {
                        descriptors.push(descriptor);
                    }
                }
            }
        }

        let namespace = format!("{}.$cmd.listCollections", database);
        let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE as usize);
        ok_reply(self.open_cursor(namespace, descriptors.into(), batch_size))
    }

    /// Build `{cursor: {id, ns, firstBatch}}`, registering the rest server-side
    fn open_cursor(&self, namespace: String, mut results: VecDeque<Document>, batch_size: usize) -> Document {
        let take = batch_size.min(results.len());
        let first_batch: Vec<Value> = results.drain(..take).map(Value::Object).collect();

        let id = if results.is_empty() {
            0
        } else {
            let id = self.next_cursor_id.fetch_add(1, Ordering::SeqCst);
            self.cursors.lock().insert(
                id,
                OpenCursor {
                    namespace: namespace.clone(),
                    remaining: results,
                },
            );
            id
        };

        let mut reply = Document::new();
        reply.insert(
            "cursor".to_string(),
            json!({ "id": id, "ns": namespace, "firstBatch": first_batch }),
        );
        reply
    }

    fn get_more(&self, database: &str, command: &Document) -> ServerResult {
        let id = command
            .get("getMore")
            .and_then(Value::as_i64)
            .ok_or_else(|| ServerError::bad_value("getMore must be a cursor id"))?;
        let collection = command
            .get("collection")
            .and_then(Value::as_str)
            .ok_or_else(|| ServerError::bad_value("getMore requires a 'collection' string"))?;
        let batch_size = optional_batch_size(command, "batchSize")?;
        let namespace = format!("{}.{}", database, collection);

        let mut cursors = self.cursors.lock();
        let cursor = cursors.get_mut(&id).ok_or_else(|| {
            ServerError::new(
                codes::CURSOR_NOT_FOUND,
                "CursorNotFound",
                format!("cursor id {} not found", id),
            )
        })?;

        if cursor.namespace != namespace {
            return Err(ServerError::new(
                UNAUTHORIZED,
                "Unauthorized",
                format!(
                    "Requested getMore on namespace '{}', but cursor belongs to a different namespace {}",
                    namespace, cursor.namespace
                ),
            ));
        }

        let take = batch_size
            .filter(|n| *n > 0)
            .unwrap_or(cursor.remaining.len())
            .min(cursor.remaining.len());
        let next_batch: Vec<Value> = cursor.remaining.drain(..take).map(Value::Object).collect();

        let next_id = if cursor.remaining.is_empty() {
            cursors.remove(&id);
            0
        } else {
            id
        };

        let mut reply = Document::new();
        reply.insert(
            "cursor".to_string(),
            json!({ "id": next_id, "ns": namespace, "nextBatch": next_batch }),
        );
        ok_reply(reply)
    }

    fn kill_cursors(&self, command: &Document) -> ServerResult {
        let ids = command
            .get("cursors")
            .and_then(Value::as_array)
            .ok_or_else(|| ServerError::bad_value("killCursors requires a 'cursors' array"))?;

        let mut killed = Vec::new();
        let mut not_found = Vec::new();
        let mut cursors = self.cursors.lock();
        for id in ids {
            let id = id
                .as_i64()
                .ok_or_else(|| ServerError::bad_value("cursor ids must be integers"))?;
            if cursors.remove(&id).is_some() {
                killed.push(id);
            } else {
                not_found.push(id);
            }
        }

        let mut reply = Document::new();
        reply.insert("cursorsKilled".to_string(), json!(killed));
        reply.insert("cursorsNotFound".to_string(), json!(not_found));
        reply.insert("cursorsAlive".to_string(), json!([]));
        reply.insert("cursorsUnknown".to_string(), json!([]));
        ok_reply(reply)
    }

    fn db_stats(&self, database: &str, command: &Document) -> ServerResult {
        let scale = match command.get("scale") {
            None => 1,
            Some(value) => match value.as_u64() {
                Some(n) if n >= 1 => n,
                _ => return Err(ServerError::bad_value("Scale factor must be greater than zero")),
            },
        };

        let state = self.state.lock();
        let (collections, objects, data_size) = match state.databases.get(database) {
            Some(db) => (
                db.collections.len() as u64,
                db.collections.values().map(|c| c.documents.len() as u64).sum::<u64>(),
                db.collections.values().map(CollectionState::data_size).sum::<u64>(),
            ),
            None => (0, 0, 0),
        };
        let avg_obj_size = if objects == 0 {
            0.0
        } else {
            data_size as f64 / objects as f64
        };

        let mut reply = Document::new();
        reply.insert("db".to_string(), json!(database));
        reply.insert("collections".to_string(), json!(collections));
        reply.insert("views".to_string(), json!(0));
        reply.insert("objects".to_string(), json!(objects));
        reply.insert("avgObjSize".to_string(), json!(avg_obj_size));
        reply.insert("dataSize".to_string(), json!(data_size / scale));
        reply.insert("storageSize".to_string(), json!(data_size / scale));
        reply.insert("indexes".to_string(), json!(collections));
        reply.insert("indexSize".to_string(), json!(0));
        reply.insert("totalSize".to_string(), json!(data_size / scale));
        reply.insert("scaleFactor".to_string(), json!(scale));
        ok_reply(reply)
    }

    fn insert(&self, database: &str, command: &Document) -> ServerResult {
        let name = target_collection(command, "insert")?;
        let raw = command
            .get("documents")
            .and_then(Value::as_array)
            .filter(|docs| !docs.is_empty())
            .ok_or_else(|| ServerError::bad_value("insert requires a nonempty 'documents' array"))?;

        let mut state = self.state.lock();
        let existing = state
            .databases
            .get(database)
            .and_then(|db| db.collections.get(name));
        let prepared = prepare_batch(database, name, existing, raw)?;
        let inserted = prepared.len();

        // Only a batch that passed every check may create the namespace
        let collection = state
            .databases
            .entry(database.to_string())
            .or_default()
            .collections
            .entry(name.to_string())
            .or_insert_with(|| CollectionState::new(Document::new()));
        collection.documents.extend(prepared);

        // Capped collections evict oldest documents first
        if collection.options.get("capped").and_then(Value::as_bool) == Some(true) {
            if let Some(max) = collection.options.get("max").and_then(Value::as_u64).filter(|m| *m > 0) {
                let excess = collection.documents.len().saturating_sub(max as usize);
                collection.documents.drain(..excess);
            }
            if let Some(size) = collection.options.get("size").and_then(Value::as_u64).filter(|s| *s > 0) {
                while collection.documents.len() > 1 && collection.data_size() > size {
                    collection.documents.remove(0);
                }
            }
        }

        let mut reply = Document::new();
        reply.insert("n".to_string(), json!(inserted));
        ok_reply(reply)
    }

    fn count(&self, database: &str, command: &Document) -> ServerResult {
        let name = target_collection(command, "count")?;
        let query = optional_filter(command, "query")?;

        let state = self.state.lock();
        let mut n = 0u64;
        if let Some(collection) = state
            .databases
            .get(database)
            .and_then(|db| db.collections.get(name))
        {
            for doc in &collection.documents {
                if matches_filter(doc, &query).map_err(ServerError::bad_value)? {
                    n += 1;
                }
            }
        }

        let mut reply = Document::new();
        reply.insert("n".to_string(), json!(n));
        ok_reply(reply)
    }
}

impl Driver for MemoryDriver {
    fn acquire_database(&self, name: &str) -> ResourceId {
        let id = ResourceId::new(self.next_resource_id.fetch_add(1, Ordering::SeqCst));
        self.resources.insert(id, name.to_string());
        debug!(database = name, resource = %id, "acquired database resource");
        id
    }

    fn release_database(&self, id: ResourceId) {
        match self.resources.remove(&id) {
            Some((_, name)) => debug!(database = %name, resource = %id, "released database resource"),
            None => warn!(resource = %id, "release of unknown database resource"),
        }
    }

    fn run_command(
        &self,
        database: &str,
        command: &Document,
        read_preference: Option<&ReadPreference>,
    ) -> Result<Document> {
        let name = command_name(command)
            .ok_or_else(|| OperationError::InvalidArgument("empty command document".to_string()))?
            .to_string();

        self.command_log.lock().push(CommandEvent {
            database: database.to_string(),
            command: command.clone(),
            read_preference: read_preference.cloned(),
        });

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(OperationError::Connection(format!(
                "server unreachable while running '{}'",
                name
            )));
        }

        if let Some(fail_point) = self.take_fail_point(&name) {
            return Err(OperationError::CommandFailed {
                command: name,
                code: fail_point.code,
                code_name: fail_point.code_name,
                message: fail_point.message,
            });
        }

        let reply = match self.dispatch(database, &name, command) {
            Ok(reply) => reply,
            Err(err) => err.into_reply(),
        };
        OperationError::from_reply(&name, reply)
    }
}
