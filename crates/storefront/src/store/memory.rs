//! In-process document store.
//!
//! Backs tests, the CLI demo, and offline mode. Snapshots are delivered
//! through `watch` channels, so a subscriber always sees the latest state
//! and intermediate values may be skipped. Faults can be injected to
//! exercise retry and failure paths.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::instrument;
use uuid::Uuid;

use super::access::{self, Operation};
use super::{
    Caller, DocPath, Document, DocumentStore, Revision, StoreError, StoreResult, WriteMode,
    merge_json,
};

/// In-memory [`DocumentStore`]. Clones share the same contents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    docs: BTreeMap<DocPath, Document>,
    revision: u64,
    last_timestamp: Option<DateTime<Utc>>,
    idempotency: HashMap<(DocPath, String), DocPath>,
    doc_watchers: HashMap<DocPath, watch::Sender<Option<Document>>>,
    collection_watchers: HashMap<DocPath, watch::Sender<Vec<Document>>>,
    faults: Faults,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    fail_next: u32,
    drop_acks: u32,
    fail_under: Vec<(String, u32)>,
}

/// What a mutating call should do after passing fault checks.
enum AckFault {
    None,
    /// Apply the change, then report the store as unreachable.
    Drop,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryStore")
            .field("documents", &state.docs.len())
            .field("revision", &state.revision)
            .field("faults", &state.faults)
            .finish()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Fault injection =====

    /// Make every call fail with [`StoreError::Unavailable`] until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().faults.unavailable = unavailable;
    }

    /// Fail the next `count` mutating calls (write, create, delete).
    pub fn fail_next_writes(&self, count: u32) {
        self.lock().faults.fail_next = count;
    }

    /// Fail the next `count` mutating calls whose path starts with `prefix`.
    pub fn fail_writes_under(&self, prefix: &DocPath, count: u32) {
        self.lock()
            .faults
            .fail_under
            .push((prefix.as_str().to_owned(), count));
    }

    /// Apply the next `count` mutating calls but report them as failed, as
    /// when a response is lost after the store committed.
    pub fn drop_next_acks(&self, count: u32) {
        self.lock().faults.drop_acks = count;
    }

    /// Clear all injected faults.
    pub fn clear_faults(&self) {
        self.lock().faults = Faults::default();
    }

    // ===== Inspection =====

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().docs.is_empty()
    }

    /// Current store revision.
    #[must_use]
    pub fn revision(&self) -> Revision {
        Revision(self.lock().revision)
    }

    // ===== Snapshots =====

    /// Export every document as JSON.
    #[must_use]
    pub fn export(&self) -> Value {
        let state = self.lock();
        let snapshot = Snapshot {
            revision: state.revision,
            documents: state.docs.values().cloned().collect(),
            idempotency: state
                .idempotency
                .iter()
                .map(|((collection, key), path)| IdempotencyEntry {
                    collection: collection.clone(),
                    key: key.clone(),
                    path: path.clone(),
                })
                .collect(),
        };
        serde_json::to_value(snapshot).unwrap_or(Value::Null)
    }

    /// Replace all contents with a previously exported snapshot.
    ///
    /// Live subscribers are notified of the new contents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Format`] if `snapshot` is not a valid export.
    pub fn import(&self, snapshot: Value) -> StoreResult<()> {
        let snapshot: Snapshot = serde_json::from_value(snapshot)?;
        let mut state = self.lock();
        let previous: Vec<DocPath> = state.docs.keys().cloned().collect();
        state.docs = snapshot
            .documents
            .into_iter()
            .map(|doc| (doc.path.clone(), doc))
            .collect();
        let max_revision = state.docs.values().map(|d| d.revision.0).max().unwrap_or(0);
        state.revision = snapshot.revision.max(max_revision);
        state.idempotency = snapshot
            .idempotency
            .into_iter()
            .map(|e| ((e.collection, e.key), e.path))
            .collect();
        let touched: Vec<DocPath> = previous
            .into_iter()
            .chain(state.docs.keys().cloned())
            .collect();
        for path in &touched {
            state.notify(path);
        }
        tracing::info!(documents = state.docs.len(), revision = state.revision, "store snapshot imported");
        Ok(())
    }

    /// Write the exported snapshot to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::Format`] on failure.
    pub async fn save_to(&self, path: &Path) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(&self.export())?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Load a snapshot previously written by [`save_to`](Self::save_to).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::Format`] on failure.
    pub async fn load_from(&self, path: &Path) -> StoreResult<()> {
        let bytes = tokio::fs::read(path).await?;
        self.import(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    revision: u64,
    documents: Vec<Document>,
    #[serde(default)]
    idempotency: Vec<IdempotencyEntry>,
}

#[derive(Serialize, Deserialize)]
struct IdempotencyEntry {
    collection: DocPath,
    key: String,
    path: DocPath,
}

// ===== State internals =====

impl State {
    fn check_read(&self) -> StoreResult<()> {
        if self.faults.unavailable {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        Ok(())
    }

    fn check_write(&mut self, path: &DocPath) -> StoreResult<AckFault> {
        self.check_read()?;
        if self.faults.fail_next > 0 {
            self.faults.fail_next -= 1;
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        if let Some((_, remaining)) = self
            .faults
            .fail_under
            .iter_mut()
            .find(|(prefix, remaining)| *remaining > 0 && path.as_str().starts_with(prefix.as_str()))
        {
            *remaining -= 1;
            return Err(StoreError::Unavailable(format!("injected write failure under {path}")));
        }
        if self.faults.drop_acks > 0 {
            self.faults.drop_acks -= 1;
            return Ok(AckFault::Drop);
        }
        Ok(AckFault::None)
    }

    fn next_revision(&mut self) -> Revision {
        self.revision += 1;
        Revision(self.revision)
    }

    /// Server timestamp, strictly increasing across calls.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + TimeDelta::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn children(&self, collection: &DocPath) -> Vec<Document> {
        self.docs
            .values()
            .filter(|d| d.path.parent().as_ref() == Some(collection))
            .cloned()
            .collect()
    }

    fn put(&mut self, path: &DocPath, data: Value, mode: WriteMode) -> Document {
        let revision = self.next_revision();
        let now = self.stamp();
        let doc = match self.docs.get(path) {
            Some(existing) => {
                let mut body = existing.data.clone();
                match mode {
                    WriteMode::Replace => body = data,
                    WriteMode::Merge => merge_json(&mut body, data),
                }
                Document {
                    path: path.clone(),
                    revision,
                    data: body,
                    created_at: existing.created_at,
                    updated_at: now,
                }
            }
            None => Document {
                path: path.clone(),
                revision,
                data,
                created_at: now,
                updated_at: now,
            },
        };
        self.docs.insert(path.clone(), doc.clone());
        self.notify(path);
        doc
    }

    fn notify(&mut self, path: &DocPath) {
        let current = self.docs.get(path).cloned();
        if let Some(sender) = self.doc_watchers.get(path) {
            sender.send_replace(current);
        }
        if let Some(parent) = path.parent() {
            let children = self.children(&parent);
            if let Some(sender) = self.collection_watchers.get(&parent) {
                sender.send_replace(children);
            }
        }
        self.doc_watchers.retain(|_, s| s.receiver_count() > 0);
        self.collection_watchers.retain(|_, s| s.receiver_count() > 0);
    }
}

fn document_path(path: &DocPath) -> StoreResult<()> {
    if path.is_document() {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(format!("{path} is not a document path")))
    }
}

fn collection_path(path: &DocPath) -> StoreResult<()> {
    if path.is_collection() {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(format!("{path} is not a collection path")))
    }
}

fn lost_ack(path: &DocPath) -> StoreError {
    tracing::debug!(path = %path, "dropping acknowledgement of committed change");
    StoreError::Unavailable(format!("connection lost before acknowledgement for {path}"))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, caller: &Caller, path: &DocPath) -> StoreResult<Option<Document>> {
        document_path(path)?;
        access::authorize(caller, Operation::Read, path)?;
        let state = self.lock();
        state.check_read()?;
        Ok(state.docs.get(path).cloned())
    }

    async fn list(&self, caller: &Caller, collection: &DocPath) -> StoreResult<Vec<Document>> {
        collection_path(collection)?;
        access::authorize(caller, Operation::Read, collection)?;
        let state = self.lock();
        state.check_read()?;
        Ok(state.children(collection))
    }

    async fn list_group(&self, caller: &Caller, collection_id: &str) -> StoreResult<Vec<Document>> {
        access::authorize_group(caller, collection_id)?;
        let state = self.lock();
        state.check_read()?;
        Ok(state
            .docs
            .values()
            .filter(|d| d.path.parent().is_some_and(|p| p.id() == collection_id))
            .cloned()
            .collect())
    }

    #[instrument(level = "debug", skip_all, fields(path = %path))]
    async fn watch_document(
        &self,
        caller: &Caller,
        path: &DocPath,
    ) -> StoreResult<watch::Receiver<Option<Document>>> {
        document_path(path)?;
        access::authorize(caller, Operation::Read, path)?;
        let mut state = self.lock();
        state.check_read()?;
        let current = state.docs.get(path).cloned();
        let sender = state
            .doc_watchers
            .entry(path.clone())
            .or_insert_with(|| watch::Sender::new(current));
        Ok(sender.subscribe())
    }

    #[instrument(level = "debug", skip_all, fields(collection = %collection))]
    async fn watch_collection(
        &self,
        caller: &Caller,
        collection: &DocPath,
    ) -> StoreResult<watch::Receiver<Vec<Document>>> {
        collection_path(collection)?;
        access::authorize(caller, Operation::Read, collection)?;
        let mut state = self.lock();
        state.check_read()?;
        let current = state.children(collection);
        let sender = state
            .collection_watchers
            .entry(collection.clone())
            .or_insert_with(|| watch::Sender::new(current));
        Ok(sender.subscribe())
    }

    #[instrument(level = "debug", skip_all, fields(path = %path, mode = ?mode))]
    async fn write(
        &self,
        caller: &Caller,
        path: &DocPath,
        data: Value,
        mode: WriteMode,
    ) -> StoreResult<Document> {
        document_path(path)?;
        access::authorize(caller, Operation::Write, path)?;
        let mut state = self.lock();
        let fault = state.check_write(path)?;
        let doc = state.put(path, data, mode);
        tracing::debug!(revision = %doc.revision, "document written");
        match fault {
            AckFault::None => Ok(doc),
            AckFault::Drop => Err(lost_ack(path)),
        }
    }

    #[instrument(level = "debug", skip_all, fields(collection = %collection))]
    async fn create(
        &self,
        caller: &Caller,
        collection: &DocPath,
        data: Value,
        idempotency_key: Option<&str>,
    ) -> StoreResult<Document> {
        collection_path(collection)?;
        access::authorize(caller, Operation::Create, collection)?;
        let mut state = self.lock();
        let fault = state.check_write(collection)?;

        if let Some(key) = idempotency_key {
            let existing = state
                .idempotency
                .get(&(collection.clone(), key.to_owned()))
                .and_then(|path| state.docs.get(path))
                .cloned();
            if let Some(doc) = existing {
                tracing::info!(path = %doc.path, key, "create replayed by idempotency key");
                return match fault {
                    AckFault::None => Ok(doc),
                    AckFault::Drop => Err(lost_ack(&doc.path)),
                };
            }
        }

        let path = collection.child(&Uuid::new_v4().simple().to_string());
        let doc = state.put(&path, data, WriteMode::Replace);
        if let Some(key) = idempotency_key {
            state
                .idempotency
                .insert((collection.clone(), key.to_owned()), path.clone());
        }
        tracing::debug!(path = %path, revision = %doc.revision, "document created");
        match fault {
            AckFault::None => Ok(doc),
            AckFault::Drop => Err(lost_ack(&path)),
        }
    }

    #[instrument(level = "debug", skip_all, fields(path = %path))]
    async fn delete(&self, caller: &Caller, path: &DocPath) -> StoreResult<()> {
        document_path(path)?;
        access::authorize(caller, Operation::Delete, path)?;
        let mut state = self.lock();
        let fault = state.check_write(path)?;
        if state.docs.remove(path).is_none() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        state.next_revision();
        state.notify(path);
        match fault {
            AckFault::None => Ok(()),
            AckFault::Drop => Err(lost_ack(path)),
        }
    }
}
