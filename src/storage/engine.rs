//! In-Memory Document Engine
//!
//! Collections keyed by stable id, each guarded by its own lock. Clustered
//! collections keep records ordered by `_id`; other collections assign a
//! sequential record id. Secondary indexes are ordered sets of
//! `(key, record key)` pairs so range deletes only touch matching entries.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::collection::{
    CollectionId, CollectionInfo, CollectionOptions, Document, IndexInfo, Namespace, ID_FIELD,
};
use super::error::{EngineError, ExecutorError};
use super::value::Value;

/// Default time a deletion waits for a collection lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// What a range delete scans
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTarget {
    /// Named secondary index
    Index(String),
    /// The collection's clustering key
    ClusteredKey,
}

/// Bounded delete request. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeDelete {
    pub target: ScanTarget,
    pub lower: Value,
    pub upper: Value,
}

/// Storage surface consumed by the TTL reaper
pub trait DeletionExecutor: Send + Sync {
    /// Resolve a collection's current metadata by stable id
    fn lookup_collection(&self, id: CollectionId) -> Option<CollectionInfo>;

    /// Delete every document of collection `id` whose scanned key lies
    /// within the request's bounds. Returns the number of documents removed.
    ///
    /// Addressed by id so a concurrent rename can never redirect the delete
    /// to whatever collection takes over the old name.
    fn delete_range(&self, id: CollectionId, request: &RangeDelete) -> Result<u64, ExecutorError>;
}

#[derive(Debug, Default)]
struct SecondaryIndex {
    field: String,
    entries: BTreeSet<(Value, Value)>,
}

#[derive(Debug, Default)]
struct CollectionData {
    records: BTreeMap<Value, Document>,
    indexes: BTreeMap<String, SecondaryIndex>,
    next_record: i64,
}

impl CollectionData {
    fn index_document(&mut self, key: &Value, doc: &Document) {
        for index in self.indexes.values_mut() {
            for k in doc.index_keys(&index.field) {
                index.entries.insert((k, key.clone()));
            }
        }
    }

    fn remove(&mut self, key: &Value) -> bool {
        let Some(doc) = self.records.remove(key) else {
            return false;
        };
        for index in self.indexes.values_mut() {
            for k in doc.index_keys(&index.field) {
                index.entries.remove(&(k, key.clone()));
            }
        }
        true
    }
}

#[derive(Debug)]
struct CollectionEntry {
    meta: RwLock<CollectionInfo>,
    data: RwLock<CollectionData>,
}

/// In-memory document engine
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    collections: Arc<DashMap<CollectionId, Arc<CollectionEntry>>>,
    names: Arc<DashMap<Namespace, CollectionId>>,
    next_id: Arc<AtomicU64>,
    lock_timeout: Duration,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(DashMap::new()),
            names: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set how long deletions wait for a collection lock
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn entry(&self, id: CollectionId) -> Result<Arc<CollectionEntry>, EngineError> {
        self.collections
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(EngineError::CollectionNotFound(id))
    }

    pub fn create_collection(
        &self,
        namespace: impl Into<Namespace>,
        options: CollectionOptions,
    ) -> Result<CollectionId, EngineError> {
        let namespace = namespace.into();
        let id = CollectionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        match self.names.entry(namespace.clone()) {
            Entry::Occupied(_) => return Err(EngineError::NamespaceExists(namespace)),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let info = CollectionInfo {
            id,
            namespace: namespace.clone(),
            options,
            indexes: Vec::new(),
            resharding_temporary: false,
            drop_pending: false,
        };
        self.collections.insert(
            id,
            Arc::new(CollectionEntry {
                meta: RwLock::new(info),
                data: RwLock::new(CollectionData::default()),
            }),
        );

        debug!(%namespace, collection = %id, ?options, "Created collection");
        Ok(id)
    }

    pub fn drop_collection(&self, id: CollectionId) -> Result<(), EngineError> {
        let (_, entry) = self
            .collections
            .remove(&id)
            .ok_or(EngineError::CollectionNotFound(id))?;
        let namespace = entry.meta.read().namespace.clone();
        self.names.remove(&namespace);
        debug!(%namespace, collection = %id, "Dropped collection");
        Ok(())
    }

    pub fn rename_collection(
        &self,
        id: CollectionId,
        to: impl Into<Namespace>,
    ) -> Result<(), EngineError> {
        let to = to.into();
        let entry = self.entry(id)?;

        match self.names.entry(to.clone()) {
            Entry::Occupied(_) => return Err(EngineError::NamespaceExists(to)),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let mut meta = entry.meta.write();
        self.names.remove(&meta.namespace);
        meta.namespace = to;
        Ok(())
    }

    /// Build a single-field secondary index over existing documents
    pub fn create_index(
        &self,
        id: CollectionId,
        name: &str,
        field: &str,
    ) -> Result<(), EngineError> {
        let entry = self.entry(id)?;
        let mut meta = entry.meta.write();
        if meta.index(name).is_some() {
            return Err(EngineError::IndexExists {
                namespace: meta.namespace.clone(),
                name: name.to_string(),
            });
        }

        let mut data = entry.data.write();
        let mut index = SecondaryIndex {
            field: field.to_string(),
            entries: BTreeSet::new(),
        };
        for (key, doc) in &data.records {
            for k in doc.index_keys(field) {
                index.entries.insert((k, key.clone()));
            }
        }
        data.indexes.insert(name.to_string(), index);
        meta.indexes.push(IndexInfo {
            name: name.to_string(),
            field: field.to_string(),
        });
        Ok(())
    }

    pub fn drop_index(&self, id: CollectionId, name: &str) -> Result<(), EngineError> {
        let entry = self.entry(id)?;
        let mut meta = entry.meta.write();
        if meta.index(name).is_none() {
            return Err(EngineError::IndexNotFound {
                namespace: meta.namespace.clone(),
                name: name.to_string(),
            });
        }
        meta.indexes.retain(|i| i.name != name);
        entry.data.write().indexes.remove(name);
        Ok(())
    }

    /// Insert a document, returning its record key
    pub fn insert(&self, id: CollectionId, doc: Document) -> Result<Value, EngineError> {
        let entry = self.entry(id)?;
        let meta = entry.meta.read();
        let mut data = entry.data.write();

        let key = if meta.is_clustered() {
            let key = doc
                .get(ID_FIELD)
                .cloned()
                .ok_or_else(|| EngineError::MissingClusterKey(meta.namespace.clone()))?;
            if data.records.contains_key(&key) {
                return Err(EngineError::DuplicateKey(meta.namespace.clone()));
            }
            key
        } else {
            data.next_record += 1;
            Value::Int(data.next_record)
        };

        data.index_document(&key, &doc);
        data.records.insert(key.clone(), doc);
        Ok(key)
    }

    pub fn find(&self, id: CollectionId, key: &Value) -> Option<Document> {
        let entry = self.entry(id).ok()?;
        let data = entry.data.read();
        data.records.get(key).cloned()
    }

    /// Number of documents in the collection (0 if it does not exist)
    pub fn count(&self, id: CollectionId) -> usize {
        self.entry(id)
            .map(|e| e.data.read().records.len())
            .unwrap_or(0)
    }

    pub fn set_drop_pending(&self, id: CollectionId, pending: bool) -> Result<(), EngineError> {
        self.entry(id)?.meta.write().drop_pending = pending;
        Ok(())
    }

    pub fn set_resharding_temporary(
        &self,
        id: CollectionId,
        temporary: bool,
    ) -> Result<(), EngineError> {
        self.entry(id)?.meta.write().resharding_temporary = temporary;
        Ok(())
    }

    /// Run `f` while holding the collection's exclusive lock, the way a
    /// long-running foreground write would.
    pub fn with_exclusive_lock<R>(
        &self,
        id: CollectionId,
        f: impl FnOnce() -> R,
    ) -> Result<R, EngineError> {
        let entry = self.entry(id)?;
        let _guard = entry.data.write();
        Ok(f())
    }
}

impl DeletionExecutor for MemoryEngine {
    fn lookup_collection(&self, id: CollectionId) -> Option<CollectionInfo> {
        let entry = self.collections.get(&id).map(|e| Arc::clone(e.value()))?;
        let info = entry.meta.read().clone();
        Some(info)
    }

    fn delete_range(&self, id: CollectionId, request: &RangeDelete) -> Result<u64, ExecutorError> {
        let entry = self
            .entry(id)
            .map_err(|_| ExecutorError::CollectionNotFound(id))?;
        let (namespace, clustered) = {
            let meta = entry.meta.read();
            (meta.namespace.clone(), meta.is_clustered())
        };

        let mut data = entry
            .data
            .try_write_for(self.lock_timeout)
            .ok_or_else(|| ExecutorError::LockTimeout {
                namespace: namespace.clone(),
                timeout: self.lock_timeout,
            })?;

        if request.lower > request.upper {
            return Ok(0);
        }

        let keys: BTreeSet<Value> = match &request.target {
            ScanTarget::ClusteredKey => {
                if !clustered {
                    return Err(ExecutorError::NotClustered(namespace));
                }
                data.records
                    .range(request.lower.clone()..=request.upper.clone())
                    .map(|(k, _)| k.clone())
                    .collect()
            }
            ScanTarget::Index(name) => {
                let index =
                    data.indexes
                        .get(name)
                        .ok_or_else(|| ExecutorError::IndexNotFound {
                            namespace: namespace.clone(),
                            name: name.clone(),
                        })?;
                let start = (request.lower.clone(), Value::MinKey);
                let end = (request.upper.clone(), Value::MaxKey);
                index
                    .entries
                    .range(start..=end)
                    .map(|(_, k)| k.clone())
                    .collect()
            }
        };

        let mut deleted = 0;
        for key in &keys {
            if data.remove(key) {
                deleted += 1;
            }
        }
        debug!(%namespace, collection = %id, deleted, "Range delete");
        Ok(deleted)
    }
}
