use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, Weak};

use redis::aio::ConnectionManager;
use redis::{Client, Script};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use super::{
    DocRef, Document, DocumentStore, Fields, Query, Subscription, TxnReads, WritePlan, fingerprint, stage_write,
    take_server_timestamps,
};
use crate::config::StoreSettings;
use crate::errors::SyncError;
use crate::keys::KeyContext;
use crate::store::Disposable;

pub const COMMIT_SCRIPT_BODY: &str = include_str!("../../lua/commit.lua");

pub static COMMIT_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(COMMIT_SCRIPT_BODY));

/// Redis-backed document store.
///
/// Each document is a hash holding its version (`v`), commit time (`t`) and
/// JSON body (`body`); a per-collection set indexes the ids. Commits run as one
/// Lua script that checks the expected versions, stamps the server time,
/// writes, and publishes the touched documents on the changes channel.
///
/// All watches of a store share one pub/sub connection.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
    keys: KeyContext,
    max_attempts: u32,
    hub: Arc<ChangeHub>,
}

#[derive(Serialize)]
struct VersionCheck {
    key: String,
    version: u64,
}

#[derive(Serialize)]
struct StagedWrite {
    key: String,
    index: String,
    id: String,
    body: Option<String>,
    /// JSON-encoded names of the fields the script sets to the commit time.
    stamped: Vec<String>,
}

#[derive(Serialize)]
struct CommitPayload<'a> {
    checks: Vec<VersionCheck>,
    writes: Vec<StagedWrite>,
    seq_key: String,
    clock_key: String,
    channel: String,
    collections: Vec<&'a str>,
    documents: Vec<TouchedDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TouchedDocument {
    collection: String,
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChangeNotice {
    #[serde(default)]
    collections: Vec<String>,
    #[serde(default)]
    documents: Vec<TouchedDocument>,
}

enum CommitOutcome {
    Committed,
    Conflict,
}

enum WatchScope {
    Document(DocRef),
    Collection(String),
}

impl WatchScope {
    fn woken_by(&self, notice: &ChangeNotice) -> bool {
        match self {
            WatchScope::Document(reference) => notice
                .documents
                .iter()
                .any(|doc| doc.collection == reference.collection && doc.id == reference.id),
            WatchScope::Collection(collection) => notice.collections.iter().any(|c| c == collection),
        }
    }
}

struct Watcher {
    scope: WatchScope,
    wake: Arc<Notify>,
}

type WatcherMap = HashMap<u64, Watcher>;

fn lock_watchers(watchers: &Mutex<WatcherMap>) -> MutexGuard<'_, WatcherMap> {
    watchers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn wake_all(watchers: &Mutex<WatcherMap>) {
    for watcher in lock_watchers(watchers).values() {
        watcher.wake.notify_one();
    }
}

/// Wakes every watcher a notice concerns. Unreadable notices wake everyone.
fn dispatch(watchers: &Mutex<WatcherMap>, payload: &str) {
    let notice = serde_json::from_str::<ChangeNotice>(payload).ok();
    for watcher in lock_watchers(watchers).values() {
        if notice.as_ref().is_none_or(|notice| watcher.scope.woken_by(notice)) {
            watcher.wake.notify_one();
        }
    }
}

/// Single change listener of a store, fanning notices out to registered watchers.
#[derive(Default)]
struct ChangeHub {
    watchers: Arc<Mutex<WatcherMap>>,
    next_id: AtomicU64,
    listener: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChangeHub {
    /// Starts the listener, or restarts it after its connection dropped.
    async fn ensure_listening(&self, client: &Client, channel: &str) -> Result<(), SyncError> {
        let mut listener = self.listener.lock().await;
        if listener.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        if listener.is_some() {
            log::info!("redis change listener on {channel} restarted");
            // Changes may have been missed while it was down.
            wake_all(&self.watchers);
        }

        let watchers = Arc::clone(&self.watchers);
        let channel = channel.to_string();
        *listener = Some(tokio::spawn(async move {
            let messages = pubsub.on_message();
            tokio::pin!(messages);
            while let Some(message) = messages.next().await {
                let payload: String = message.get_payload().unwrap_or_default();
                dispatch(&watchers, &payload);
            }
            log::warn!("redis change listener on {channel} stopped");
        }));
        Ok(())
    }

    fn register(&self, scope: WatchScope) -> (u64, Arc<Notify>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let wake = Arc::new(Notify::new());
        lock_watchers(&self.watchers).insert(
            id,
            Watcher {
                scope,
                wake: Arc::clone(&wake),
            },
        );
        (id, wake)
    }

    fn unregister(&self, id: u64) {
        lock_watchers(&self.watchers).remove(&id);
    }

    /// Releases the watcher and stops its refresh task.
    fn disposable(&self, id: u64, task: JoinHandle<()>) -> Disposable {
        let watchers: Weak<Mutex<WatcherMap>> = Arc::downgrade(&self.watchers);
        Disposable::new(move || {
            task.abort();
            if let Some(watchers) = watchers.upgrade()
                && lock_watchers(&watchers).remove(&id).is_some()
            {
                log::debug!("disposed redis watcher {id}");
            }
        })
    }

    fn len(&self) -> usize {
        lock_watchers(&self.watchers).len()
    }
}

impl Drop for ChangeHub {
    fn drop(&mut self) {
        if let Some(task) = self.listener.get_mut().take() {
            task.abort();
        }
    }
}

impl RedisStore {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub async fn open(redis_url: &str, keys: KeyContext) -> Result<Self, SyncError> {
        let client = Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        log::debug!("connected redis store under {}", keys.pattern());
        Ok(Self {
            client,
            conn,
            keys,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            hub: Arc::new(ChangeHub::default()),
        })
    }

    pub async fn connect(settings: &StoreSettings) -> Result<Self, SyncError> {
        let url = settings.resolved_redis_url()?;
        let keys = KeyContext::new(&settings.prefix, &settings.service);
        Ok(Self::open(&url, keys).await?.with_max_attempts(settings.max_transaction_attempts))
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn keys(&self) -> &KeyContext {
        &self.keys
    }

    /// Number of live document and query watches.
    pub fn watcher_count(&self) -> usize {
        self.hub.len()
    }

    /// Deletes every key written under this store's prefix.
    ///
    /// Uses SCAN + DEL so Redis is never blocked by a single large command.
    pub async fn cleanup(&self) -> Result<u64, SyncError> {
        const SCAN_COUNT: usize = 1000;
        let mut conn = self.conn.clone();
        let pattern = self.keys.pattern();
        let mut cursor: u64 = 0;
        let mut total_deleted: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                total_deleted += deleted;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(total_deleted)
    }

    /// Stages `plan` on top of the documents in `base` (reading any others)
    /// and commits it if every involved document still has its observed version.
    async fn commit_against(&self, plan: &WritePlan, base: &TxnReads) -> Result<CommitOutcome, SyncError> {
        if plan.is_empty() {
            return Ok(CommitOutcome::Committed);
        }
        let mut conn = self.conn.clone();
        let mut expected: BTreeMap<DocRef, u64> = base.versions().map(|(r, v)| (r.clone(), v)).collect();
        let mut staged: BTreeMap<DocRef, Option<Fields>> = BTreeMap::new();

        for op in &plan.ops {
            let reference = op.reference();
            let current = match staged.get(reference) {
                Some(state) => state.clone(),
                None if expected.contains_key(reference) => base.get(reference).map(|doc| doc.fields.clone()),
                None => {
                    let doc = read_document(&mut conn, &self.keys, reference).await?;
                    expected.insert(reference.clone(), doc.as_ref().map_or(0, |d| d.version));
                    doc.map(|d| d.fields)
                }
            };
            staged.insert(reference.clone(), stage_write(current, op)?);
        }

        let mut collections: Vec<&str> = Vec::new();
        let mut documents = Vec::with_capacity(staged.len());
        let mut writes = Vec::with_capacity(staged.len());
        for (reference, state) in &staged {
            let (body, stamped) = match state {
                Some(fields) => {
                    let mut fields = fields.clone();
                    let stamped = take_server_timestamps(&mut fields)
                        .iter()
                        .map(|name| serde_json::to_string(name))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|err| SyncError::Other {
                            message: format!("failed to encode field names of {reference}: {err}").into(),
                        })?;
                    let body = serde_json::to_string(&fields).map_err(|err| SyncError::Other {
                        message: format!("failed to serialize {reference}: {err}").into(),
                    })?;
                    (Some(body), stamped)
                }
                None => (None, Vec::new()),
            };
            if !collections.contains(&reference.collection.as_str()) {
                collections.push(&reference.collection);
            }
            documents.push(TouchedDocument {
                collection: reference.collection.clone(),
                id: reference.id.clone(),
            });
            writes.push(StagedWrite {
                key: self.keys.document(&reference.collection, &reference.id),
                index: self.keys.collection_index(&reference.collection),
                id: reference.id.clone(),
                body,
                stamped,
            });
        }

        let payload = CommitPayload {
            checks: expected
                .iter()
                .map(|(reference, version)| VersionCheck {
                    key: self.keys.document(&reference.collection, &reference.id),
                    version: *version,
                })
                .collect(),
            writes,
            seq_key: self.keys.sequence(),
            clock_key: self.keys.clock(),
            channel: self.keys.changes_channel(),
            collections,
            documents,
        };
        let payload = serde_json::to_string(&payload).map_err(|err| SyncError::Other {
            message: format!("failed to serialize commit: {err}").into(),
        })?;

        let mut invocation = COMMIT_SCRIPT.prepare_invoke();
        invocation.arg(payload);
        let raw: String = invocation.invoke_async(&mut conn).await?;
        let response: Value = serde_json::from_str(&raw).map_err(|err| SyncError::Other {
            message: format!("failed to parse lua response: {err}").into(),
        })?;

        match response.get("error").and_then(Value::as_str) {
            None => Ok(CommitOutcome::Committed),
            Some("version_conflict") => {
                log::debug!(
                    "version conflict on {} (expected {}, found {})",
                    response.get("key").and_then(Value::as_str).unwrap_or("?"),
                    response.get("expected").and_then(Value::as_u64).unwrap_or_default(),
                    response.get("actual").and_then(Value::as_u64).unwrap_or_default(),
                );
                Ok(CommitOutcome::Conflict)
            }
            Some(other) => Err(SyncError::Other {
                message: other.to_string().into(),
            }),
        }
    }

    /// Registers a watcher on the shared listener.
    async fn register(&self, scope: WatchScope) -> Result<(u64, Arc<Notify>), SyncError> {
        self.hub
            .ensure_listening(&self.client, &self.keys.changes_channel())
            .await?;
        Ok(self.hub.register(scope))
    }
}

fn parse_document(
    reference: &DocRef,
    version: Option<u64>,
    time: Option<i64>,
    body: Option<String>,
) -> Result<Option<Document>, SyncError> {
    let (Some(version), Some(body)) = (version, body) else {
        return Ok(None);
    };
    let fields: Fields = serde_json::from_str(&body).map_err(|err| SyncError::MalformedDocument {
        collection: reference.collection.clone(),
        id: reference.id.clone(),
        reason: err.to_string(),
    })?;
    Ok(Some(Document {
        reference: reference.clone(),
        version,
        update_time: time.unwrap_or_default(),
        fields,
    }))
}

async fn read_document(
    conn: &mut ConnectionManager,
    keys: &KeyContext,
    reference: &DocRef,
) -> Result<Option<Document>, SyncError> {
    let (version, time, body): (Option<u64>, Option<i64>, Option<String>) = redis::cmd("HMGET")
        .arg(keys.document(&reference.collection, &reference.id))
        .arg("v")
        .arg("t")
        .arg("body")
        .query_async(conn)
        .await?;
    parse_document(reference, version, time, body)
}

async fn read_documents(
    conn: &mut ConnectionManager,
    keys: &KeyContext,
    references: &[DocRef],
) -> Result<Vec<Option<Document>>, SyncError> {
    if references.is_empty() {
        return Ok(Vec::new());
    }
    let mut pipe = redis::pipe();
    for reference in references {
        pipe.cmd("HMGET")
            .arg(keys.document(&reference.collection, &reference.id))
            .arg("v")
            .arg("t")
            .arg("body");
    }
    let rows: Vec<(Option<u64>, Option<i64>, Option<String>)> = pipe.query_async(conn).await?;
    references
        .iter()
        .zip(rows)
        .map(|(reference, (version, time, body))| parse_document(reference, version, time, body))
        .collect()
}

async fn run_query(conn: &mut ConnectionManager, keys: &KeyContext, query: &Query) -> Result<Vec<Document>, SyncError> {
    let ids: Vec<String> = redis::cmd("SMEMBERS")
        .arg(keys.collection_index(&query.collection))
        .query_async(conn)
        .await?;
    let references: Vec<DocRef> = ids.into_iter().map(|id| DocRef::new(&query.collection, id)).collect();
    let docs = read_documents(conn, keys, &references).await?;
    Ok(query.evaluate(docs.into_iter().flatten()))
}

impl DocumentStore for RedisStore {
    async fn get(&self, reference: &DocRef) -> Result<Option<Document>, SyncError> {
        let mut conn = self.conn.clone();
        read_document(&mut conn, &self.keys, reference).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, SyncError> {
        let mut conn = self.conn.clone();
        run_query(&mut conn, &self.keys, query).await
    }

    async fn commit(&self, plan: WritePlan) -> Result<(), SyncError> {
        if plan.is_empty() {
            return Ok(());
        }
        let mut attempt = 0;
        loop {
            attempt += 1;
            if let CommitOutcome::Committed = self.commit_against(&plan, &TxnReads::default()).await? {
                return Ok(());
            }
            if attempt >= self.max_attempts {
                return Err(SyncError::WriteConflict { attempts: attempt });
            }
        }
    }

    async fn run_transaction<T, F>(&self, reads: &[DocRef], mut decide: F) -> Result<T, SyncError>
    where
        F: FnMut(&TxnReads) -> Result<(WritePlan, T), SyncError>,
    {
        let mut conn = self.conn.clone();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let docs = read_documents(&mut conn, &self.keys, reads).await?;
            let snapshot = TxnReads::new(reads.iter().cloned().zip(docs).collect());
            let (plan, value) = decide(&snapshot)?;
            if let CommitOutcome::Committed = self.commit_against(&plan, &snapshot).await? {
                return Ok(value);
            }
            if attempt >= self.max_attempts {
                log::warn!("transaction gave up after {attempt} attempts");
                return Err(SyncError::WriteConflict { attempts: attempt });
            }
            log::debug!("transaction conflict on attempt {attempt}, retrying");
        }
    }

    async fn watch_document(&self, reference: &DocRef) -> Result<Subscription<Option<Document>>, SyncError> {
        // Registered before the initial read, so a change in between still wakes the task.
        let (watcher, wake) = self.register(WatchScope::Document(reference.clone())).await?;
        let mut conn = self.conn.clone();
        let keys = self.keys.clone();
        let reference = reference.clone();

        let current = match read_document(&mut conn, &keys, &reference).await {
            Ok(doc) => doc,
            Err(err) => {
                self.hub.unregister(watcher);
                return Err(err);
            }
        };
        let mut last_version = current.as_ref().map(|doc| doc.version);
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(current);

        let task = tokio::spawn(async move {
            loop {
                wake.notified().await;
                let doc = match read_document(&mut conn, &keys, &reference).await {
                    Ok(doc) => doc,
                    Err(err) => {
                        log::warn!("document watch on {reference} failed to refresh: {err}");
                        continue;
                    }
                };
                let version = doc.as_ref().map(|d| d.version);
                if version == last_version {
                    continue;
                }
                last_version = version;
                if sender.send(doc).is_err() {
                    break;
                }
            }
        });
        Ok(Subscription::new(receiver, self.hub.disposable(watcher, task)))
    }

    async fn watch_query(&self, query: &Query) -> Result<Subscription<Vec<Document>>, SyncError> {
        let (watcher, wake) = self.register(WatchScope::Collection(query.collection.clone())).await?;
        let mut conn = self.conn.clone();
        let keys = self.keys.clone();
        let query = query.clone();

        let current = match run_query(&mut conn, &keys, &query).await {
            Ok(docs) => docs,
            Err(err) => {
                self.hub.unregister(watcher);
                return Err(err);
            }
        };
        let mut last_seen = fingerprint(&current);
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(current);

        let task = tokio::spawn(async move {
            loop {
                wake.notified().await;
                let docs = match run_query(&mut conn, &keys, &query).await {
                    Ok(docs) => docs,
                    Err(err) => {
                        log::warn!("query watch on {} failed to refresh: {err}", query.collection);
                        continue;
                    }
                };
                let current = fingerprint(&docs);
                if current == last_seen {
                    continue;
                }
                last_seen = current;
                if sender.send(docs).is_err() {
                    break;
                }
            }
        });
        Ok(Subscription::new(receiver, self.hub.disposable(watcher, task)))
    }
}
