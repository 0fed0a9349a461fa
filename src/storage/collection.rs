//! Collection Metadata
//!
//! Identifiers, namespaces, documents and the metadata snapshot the reaper
//! resolves on every pass.

use std::collections::BTreeMap;
use std::fmt;

use super::value::Value;

/// Field holding the clustering key of clustered collections
pub const ID_FIELD: &str = "_id";

/// Stable collection identifier, unchanged by renames
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(pub u64);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Fully qualified `db.collection` name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(ns: impl Into<String>) -> Self {
        Self(ns.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn db(&self) -> &str {
        self.0.split_once('.').map(|(db, _)| db).unwrap_or(&self.0)
    }

    pub fn coll(&self) -> &str {
        self.0.split_once('.').map(|(_, coll)| coll).unwrap_or("")
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Namespace {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A stored document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Keys this document contributes to an index on `field`. A missing
    /// field is indexed as null.
    pub fn index_keys(&self, field: &str) -> Vec<Value> {
        self.get(field)
            .map(Value::index_keys)
            .unwrap_or_else(|| vec![Value::Null])
    }
}

/// Options fixed at collection creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionOptions {
    /// Records are stored in `_id` order
    pub clustered: bool,
    /// Time-bucketed collection; implies clustered with ObjectId keys
    pub time_series: bool,
}

impl CollectionOptions {
    pub fn clustered() -> Self {
        Self {
            clustered: true,
            time_series: false,
        }
    }

    pub fn time_series() -> Self {
        Self {
            clustered: true,
            time_series: true,
        }
    }
}

/// Secondary index definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub field: String,
}

/// Point-in-time view of a collection's metadata
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub id: CollectionId,
    pub namespace: Namespace,
    pub options: CollectionOptions,
    pub indexes: Vec<IndexInfo>,
    /// Temporary target collection of an in-progress resharding
    pub resharding_temporary: bool,
    /// Dropped but not yet reclaimed
    pub drop_pending: bool,
}

impl CollectionInfo {
    pub fn is_clustered(&self) -> bool {
        self.options.clustered
    }

    pub fn index(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.name == name)
    }
}
