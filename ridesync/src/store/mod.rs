//! Document store contract consumed by the sync engine.
//!
//! The engine never talks to a database directly. Every component receives a
//! [`DocumentStore`] at construction and reads, writes, transacts and subscribes
//! through it. Two engines ship with the crate:
//!
//! - [`MemoryStore`] - in-process, used by tests, demos and offline tooling
//! - [`RedisStore`] - Redis-backed, with compare-and-set commits executed by a Lua script
//!
//! Transactions follow a plan/execute split: the caller names the documents it
//! needs, a pure `decide` closure turns those reads into a [`WritePlan`], and the
//! engine commits the plan only if none of the read documents changed in the
//! meantime. On conflict the engine re-reads and re-runs `decide`.

mod memory;
mod query;
mod redis;
mod subscription;

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value, json};

use crate::errors::SyncError;
use crate::types::{Record, decode};

pub use memory::MemoryStore;
pub use query::{Filter, FilterOp, OrderBy, Query, SortOrder};
pub use redis::RedisStore;
pub use subscription::{Disposable, Subscription};

/// Top-level field map of a stored document.
pub type Fields = Map<String, Value>;

/// Marker key of the server-timestamp sentinel.
pub const SERVER_TIMESTAMP_KEY: &str = "$serverTimestamp";

/// Sentinel replaced by the engine with the commit time (epoch microseconds).
///
/// Only honoured for top-level fields.
pub fn server_timestamp() -> Value {
    json!({ SERVER_TIMESTAMP_KEY: true })
}

pub(crate) fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.len() == 1 && obj.get(SERVER_TIMESTAMP_KEY) == Some(&Value::Bool(true)))
}

pub(crate) fn resolve_server_timestamps(fields: &mut Fields, commit_micros: i64) {
    for value in fields.values_mut() {
        if is_server_timestamp(value) {
            *value = Value::from(commit_micros);
        }
    }
}

/// Removes top-level sentinel fields and returns their names, for engines that stamp them remotely.
pub(crate) fn take_server_timestamps(fields: &mut Fields) -> Vec<String> {
    let names: Vec<String> = fields
        .iter()
        .filter(|(_, value)| is_server_timestamp(value))
        .map(|(name, _)| name.clone())
        .collect();
    for name in &names {
        fields.remove(name);
    }
    names
}

/// Address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Reference to a record type's document.
    pub fn of<T: Record>(id: impl Into<String>) -> Self {
        Self::new(T::COLLECTION, id)
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document as observed at one version.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub reference: DocRef,
    /// Commit sequence that last wrote this document.
    pub version: u64,
    /// Commit time in epoch microseconds.
    pub update_time: i64,
    pub fields: Fields,
}

impl Document {
    pub fn id(&self) -> &str {
        &self.reference.id
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// One mutation inside a [`WritePlan`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create the document, failing with `AlreadyExists` when present.
    Create { reference: DocRef, fields: Fields },
    /// Replace the document wholesale, creating it when absent.
    Set { reference: DocRef, fields: Fields },
    /// Merge top-level fields into an existing document, failing with `NotFound` when absent.
    Update { reference: DocRef, fields: Fields },
    /// Remove the document. Deleting an absent document is a no-op.
    Delete { reference: DocRef },
}

impl WriteOp {
    pub fn reference(&self) -> &DocRef {
        match self {
            WriteOp::Create { reference, .. }
            | WriteOp::Set { reference, .. }
            | WriteOp::Update { reference, .. }
            | WriteOp::Delete { reference } => reference,
        }
    }
}

/// Ordered list of writes committed atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WritePlan {
    pub ops: Vec<WriteOp>,
}

impl WritePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(mut self, reference: DocRef, fields: Fields) -> Self {
        self.ops.push(WriteOp::Create { reference, fields });
        self
    }

    pub fn set(mut self, reference: DocRef, fields: Fields) -> Self {
        self.ops.push(WriteOp::Set { reference, fields });
        self
    }

    pub fn update(mut self, reference: DocRef, fields: Fields) -> Self {
        self.ops.push(WriteOp::Update { reference, fields });
        self
    }

    pub fn delete(mut self, reference: DocRef) -> Self {
        self.ops.push(WriteOp::Delete { reference });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Distinct documents touched by the plan, in first-touch order.
    pub fn touched(&self) -> Vec<&DocRef> {
        let mut seen: Vec<&DocRef> = Vec::new();
        for op in &self.ops {
            let reference = op.reference();
            if !seen.contains(&reference) {
                seen.push(reference);
            }
        }
        seen
    }
}

/// Applies one write onto the staged state of its document.
///
/// Shared by both engines so that create/update semantics stay identical.
pub(crate) fn stage_write(current: Option<Fields>, op: &WriteOp) -> Result<Option<Fields>, SyncError> {
    match op {
        WriteOp::Create { reference, fields } => {
            if current.is_some() {
                return Err(SyncError::AlreadyExists {
                    collection: reference.collection.clone(),
                    id: reference.id.clone(),
                });
            }
            Ok(Some(fields.clone()))
        }
        WriteOp::Set { fields, .. } => Ok(Some(fields.clone())),
        WriteOp::Update { reference, fields } => {
            let mut merged = current.ok_or_else(|| SyncError::not_found(&reference.collection, &reference.id))?;
            for (key, value) in fields {
                merged.insert(key.clone(), value.clone());
            }
            Ok(Some(merged))
        }
        WriteOp::Delete { .. } => Ok(None),
    }
}

/// Documents read at the start of a transaction attempt.
#[derive(Debug, Clone, Default)]
pub struct TxnReads {
    docs: BTreeMap<DocRef, Option<Document>>,
}

impl TxnReads {
    pub(crate) fn new(docs: BTreeMap<DocRef, Option<Document>>) -> Self {
        Self { docs }
    }

    /// The document as read, `None` when absent or not part of the read set.
    pub fn get(&self, reference: &DocRef) -> Option<&Document> {
        self.docs.get(reference).and_then(Option::as_ref)
    }

    pub fn exists(&self, reference: &DocRef) -> bool {
        self.get(reference).is_some()
    }

    /// Decodes the read document into its record type.
    pub fn decode<T: Record>(&self, reference: &DocRef) -> Result<Option<T>, SyncError> {
        self.get(reference).map(decode::<T>).transpose()
    }

    /// Version observed for the document, `0` when it was absent.
    pub(crate) fn versions(&self) -> impl Iterator<Item = (&DocRef, u64)> {
        self.docs
            .iter()
            .map(|(reference, doc)| (reference, doc.as_ref().map_or(0, |d| d.version)))
    }
}

/// Contract of the networked, subscribable document database.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    async fn get(&self, reference: &DocRef) -> Result<Option<Document>, SyncError>;

    async fn get_or_error(&self, reference: &DocRef) -> Result<Document, SyncError> {
        self.get(reference)
            .await?
            .ok_or_else(|| SyncError::not_found(&reference.collection, &reference.id))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, SyncError>;

    /// Commits a plan atomically outside of a transaction.
    async fn commit(&self, plan: WritePlan) -> Result<(), SyncError>;

    async fn set(&self, reference: &DocRef, fields: Fields) -> Result<(), SyncError> {
        self.commit(WritePlan::new().set(reference.clone(), fields)).await
    }

    async fn update(&self, reference: &DocRef, fields: Fields) -> Result<(), SyncError> {
        self.commit(WritePlan::new().update(reference.clone(), fields)).await
    }

    async fn delete(&self, reference: &DocRef) -> Result<(), SyncError> {
        self.commit(WritePlan::new().delete(reference.clone())).await
    }

    /// Reads `reads`, runs `decide` and commits its plan if no read document changed.
    ///
    /// `decide` is re-invoked with fresh reads after every conflict until the
    /// engine's attempt budget is spent, then `WriteConflict` is returned.
    async fn run_transaction<T, F>(&self, reads: &[DocRef], decide: F) -> Result<T, SyncError>
    where
        F: FnMut(&TxnReads) -> Result<(WritePlan, T), SyncError>;

    /// Live snapshots of one document. The current state is delivered first.
    async fn watch_document(&self, reference: &DocRef) -> Result<Subscription<Option<Document>>, SyncError>;

    /// Live result sets of a query. The current result is delivered first.
    async fn watch_query(&self, query: &Query) -> Result<Subscription<Vec<Document>>, SyncError>;
}

/// Identity of a result set, used to suppress redundant snapshots.
pub(crate) type Fingerprint = Vec<(String, u64)>;

pub(crate) fn fingerprint(docs: &[Document]) -> Fingerprint {
    docs.iter().map(|doc| (doc.reference.id.clone(), doc.version)).collect()
}
