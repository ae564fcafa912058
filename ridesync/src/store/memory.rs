use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use tokio::sync::mpsc;

use super::{
    DocRef, Document, DocumentStore, Fields, Fingerprint, Query, Subscription, TxnReads, WritePlan, fingerprint,
    resolve_server_timestamps, stage_write,
};
use crate::config::StoreSettings;
use crate::errors::SyncError;
use crate::store::Disposable;

/// In-process document store with live subscriptions.
///
/// Transactions release the lock between their read and commit phases, so
/// concurrent callers on the same runtime genuinely interleave and conflicting
/// attempts are retried. Cloning yields another handle onto the same data.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Mutex<MemoryState>>,
    max_attempts: u32,
}

#[derive(Debug, Clone)]
struct StoredDoc {
    version: u64,
    update_time: i64,
    fields: Fields,
}

enum WatchTarget {
    Document {
        reference: DocRef,
        sender: mpsc::UnboundedSender<Option<Document>>,
        last_version: Option<u64>,
    },
    Query {
        query: Query,
        sender: mpsc::UnboundedSender<Vec<Document>>,
        last_seen: Fingerprint,
    },
}

impl WatchTarget {
    fn collection(&self) -> &str {
        match self {
            WatchTarget::Document { reference, .. } => &reference.collection,
            WatchTarget::Query { query, .. } => &query.collection,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, BTreeMap<String, StoredDoc>>,
    watchers: BTreeMap<u64, WatchTarget>,
    next_watcher: u64,
    sequence: u64,
    clock: i64,
    offline: bool,
    injected_conflicts: u32,
}

impl MemoryState {
    fn ensure_online(&self) -> Result<(), SyncError> {
        if self.offline {
            Err(SyncError::Unreachable {
                message: "memory store is offline".into(),
            })
        } else {
            Ok(())
        }
    }

    fn read(&self, reference: &DocRef) -> Option<Document> {
        self.collections
            .get(&reference.collection)
            .and_then(|docs| docs.get(&reference.id))
            .map(|stored| Document {
                reference: reference.clone(),
                version: stored.version,
                update_time: stored.update_time,
                fields: stored.fields.clone(),
            })
    }

    fn version_of(&self, reference: &DocRef) -> u64 {
        self.collections
            .get(&reference.collection)
            .and_then(|docs| docs.get(&reference.id))
            .map_or(0, |stored| stored.version)
    }

    fn run_query(&self, query: &Query) -> Vec<Document> {
        let Some(docs) = self.collections.get(&query.collection) else {
            return Vec::new();
        };
        let candidates = docs.iter().map(|(id, stored)| Document {
            reference: DocRef::new(&query.collection, id),
            version: stored.version,
            update_time: stored.update_time,
            fields: stored.fields.clone(),
        });
        query.evaluate(candidates)
    }

    fn next_timestamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_micros();
        self.clock = now.max(self.clock + 1);
        self.clock
    }

    /// Stages every write, then applies them all or none.
    fn apply(&mut self, plan: &WritePlan) -> Result<(), SyncError> {
        if plan.is_empty() {
            return Ok(());
        }
        let mut staged: BTreeMap<DocRef, Option<Fields>> = BTreeMap::new();
        for op in &plan.ops {
            let reference = op.reference();
            let current = match staged.get(reference) {
                Some(state) => state.clone(),
                None => self.read(reference).map(|doc| doc.fields),
            };
            staged.insert(reference.clone(), stage_write(current, op)?);
        }

        self.sequence += 1;
        let version = self.sequence;
        let commit_time = self.next_timestamp();
        let mut touched_collections: Vec<String> = Vec::new();
        for (reference, state) in staged {
            let collection = self.collections.entry(reference.collection.clone()).or_default();
            match state {
                Some(mut fields) => {
                    resolve_server_timestamps(&mut fields, commit_time);
                    collection.insert(
                        reference.id.clone(),
                        StoredDoc {
                            version,
                            update_time: commit_time,
                            fields,
                        },
                    );
                }
                None => {
                    collection.remove(&reference.id);
                }
            }
            if !touched_collections.contains(&reference.collection) {
                touched_collections.push(reference.collection);
            }
        }
        self.notify(&touched_collections);
        Ok(())
    }

    /// Pushes fresh snapshots to watchers whose view changed and drops closed ones.
    fn notify(&mut self, collections: &[String]) {
        let mut closed = Vec::new();
        let ids: Vec<u64> = self
            .watchers
            .iter()
            .filter(|(_, target)| collections.iter().any(|c| c == target.collection()))
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            let snapshot = match self.watchers.get(&id) {
                Some(WatchTarget::Document { reference, .. }) => Snapshot::Document(self.read(reference)),
                Some(WatchTarget::Query { query, .. }) => Snapshot::Query(self.run_query(query)),
                None => continue,
            };
            let Some(target) = self.watchers.get_mut(&id) else {
                continue;
            };
            let delivered = match (target, snapshot) {
                (
                    WatchTarget::Document {
                        sender, last_version, ..
                    },
                    Snapshot::Document(doc),
                ) => {
                    let version = doc.as_ref().map(|d| d.version);
                    if *last_version == version {
                        true
                    } else {
                        *last_version = version;
                        sender.send(doc).is_ok()
                    }
                }
                (WatchTarget::Query { sender, last_seen, .. }, Snapshot::Query(docs)) => {
                    let current = fingerprint(&docs);
                    if *last_seen == current {
                        true
                    } else {
                        *last_seen = current;
                        sender.send(docs).is_ok()
                    }
                }
                _ => true,
            };
            if !delivered {
                closed.push(id);
            }
        }

        for id in closed {
            log::debug!("dropping closed watcher {id}");
            self.watchers.remove(&id);
        }
    }

    fn register(&mut self, target: WatchTarget) -> u64 {
        self.next_watcher += 1;
        let id = self.next_watcher;
        self.watchers.insert(id, target);
        id
    }
}

enum Snapshot {
    Document(Option<Document>),
    Query(Vec<Document>),
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(MemoryState::default())),
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self::new().with_max_attempts(settings.max_transaction_attempts)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Simulates losing (or regaining) connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Forces the next `count` transaction commits to observe a conflict.
    pub fn inject_conflicts(&self, count: u32) {
        self.lock().injected_conflicts = count;
    }

    /// Number of live listeners currently registered.
    pub fn watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }

    /// Number of documents stored in a collection.
    pub fn collection_len(&self, collection: &str) -> usize {
        self.lock().collections.get(collection).map_or(0, BTreeMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn disposable(&self, watcher: u64) -> Disposable {
        let weak: Weak<Mutex<MemoryState>> = Arc::downgrade(&self.shared);
        Disposable::new(move || {
            if let Some(shared) = weak.upgrade() {
                let mut state = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if state.watchers.remove(&watcher).is_some() {
                    log::debug!("disposed watcher {watcher}");
                }
            }
        })
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, reference: &DocRef) -> Result<Option<Document>, SyncError> {
        let state = self.lock();
        state.ensure_online()?;
        Ok(state.read(reference))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, SyncError> {
        let state = self.lock();
        state.ensure_online()?;
        Ok(state.run_query(query))
    }

    async fn commit(&self, plan: WritePlan) -> Result<(), SyncError> {
        let mut state = self.lock();
        state.ensure_online()?;
        state.apply(&plan)
    }

    async fn run_transaction<T, F>(&self, reads: &[DocRef], mut decide: F) -> Result<T, SyncError>
    where
        F: FnMut(&TxnReads) -> Result<(WritePlan, T), SyncError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let snapshot = {
                let state = self.lock();
                state.ensure_online()?;
                TxnReads::new(
                    reads
                        .iter()
                        .map(|reference| (reference.clone(), state.read(reference)))
                        .collect(),
                )
            };

            // Let other writers run between the read and commit phases.
            tokio::task::yield_now().await;

            let (plan, value) = decide(&snapshot)?;

            {
                let mut state = self.lock();
                state.ensure_online()?;
                let injected = if state.injected_conflicts > 0 {
                    state.injected_conflicts -= 1;
                    true
                } else {
                    false
                };
                let stale = snapshot
                    .versions()
                    .any(|(reference, version)| state.version_of(reference) != version);
                if !injected && !stale {
                    state.apply(&plan)?;
                    return Ok(value);
                }
            }

            if attempt >= self.max_attempts {
                log::warn!("transaction gave up after {attempt} attempts");
                return Err(SyncError::WriteConflict { attempts: attempt });
            }
            log::debug!("transaction conflict on attempt {attempt}, retrying");
        }
    }

    async fn watch_document(&self, reference: &DocRef) -> Result<Subscription<Option<Document>>, SyncError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.lock();
            state.ensure_online()?;
            let current = state.read(reference);
            let last_version = current.as_ref().map(|doc| doc.version);
            // The receiver is alive here, so the initial send cannot fail.
            let _ = sender.send(current);
            state.register(WatchTarget::Document {
                reference: reference.clone(),
                sender,
                last_version,
            })
        };
        Ok(Subscription::new(receiver, self.disposable(id)))
    }

    async fn watch_query(&self, query: &Query) -> Result<Subscription<Vec<Document>>, SyncError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.lock();
            state.ensure_online()?;
            let current = state.run_query(query);
            let last_seen = fingerprint(&current);
            let _ = sender.send(current);
            state.register(WatchTarget::Query {
                query: query.clone(),
                sender,
                last_seen,
            })
        };
        Ok(Subscription::new(receiver, self.disposable(id)))
    }
}
