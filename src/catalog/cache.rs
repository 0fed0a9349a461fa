//! TTL Collection Cache
//!
//! Registry of TTL specifications, maintained by DDL and read by the reaper
//! once per pass.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use super::spec::{TtlSpec, TtlStrategy};
use crate::storage::CollectionId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("expiration catalog unavailable: {0}")]
    Unavailable(String),
}

/// Source of TTL specifications consumed by the reaper
pub trait ExpirationCatalog: Send + Sync {
    /// Point-in-time copy of every registered specification. Has no side
    /// effects on the catalog.
    fn snapshot(&self) -> Result<Vec<TtlSpec>, CatalogError>;

    /// Remove a specification whose target no longer exists
    fn deregister(&self, collection_id: CollectionId, strategy: &TtlStrategy);
}

/// In-memory expiration catalog
#[derive(Debug, Default)]
pub struct TtlCollectionCache {
    specs: RwLock<BTreeMap<CollectionId, Vec<TtlSpec>>>,
}

impl TtlCollectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a specification, replacing any spec in the same slot
    pub fn register(&self, spec: TtlSpec) {
        let mut specs = self.specs.write();
        let entries = specs.entry(spec.collection_id).or_default();
        match entries.iter_mut().find(|s| s.same_slot(&spec)) {
            Some(existing) => *existing = spec,
            None => entries.push(spec),
        }
    }

    /// Drop every specification of a collection
    pub fn deregister_collection(&self, collection_id: CollectionId) {
        self.specs.write().remove(&collection_id);
    }

    pub fn len(&self) -> usize {
        self.specs.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ExpirationCatalog for TtlCollectionCache {
    fn snapshot(&self) -> Result<Vec<TtlSpec>, CatalogError> {
        Ok(self.specs.read().values().flatten().cloned().collect())
    }

    fn deregister(&self, collection_id: CollectionId, strategy: &TtlStrategy) {
        let mut specs = self.specs.write();
        if let Some(entries) = specs.get_mut(&collection_id) {
            entries.retain(|s| &s.strategy != strategy);
            if entries.is_empty() {
                specs.remove(&collection_id);
            }
            debug!(collection = %collection_id, %strategy, "Deregistered TTL spec");
        }
    }
}
