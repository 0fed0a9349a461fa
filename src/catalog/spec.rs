//! TTL Specifications

use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;

use crate::storage::{CollectionId, Namespace};

/// Key type of a clustered collection's expiration bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundKind {
    /// The clustering key is a date
    Date,
    /// The clustering key is an ObjectId whose leading bytes hold the
    /// creation time (time-bucketed collections)
    ObjectIdTimestamp,
}

/// How expired documents are located
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TtlStrategy {
    IndexBased { index_name: String },
    ClusteredScan { bound_kind: BoundKind },
}

impl fmt::Display for TtlStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtlStrategy::IndexBased { index_name } => write!(f, "index:{}", index_name),
            TtlStrategy::ClusteredScan { bound_kind } => match bound_kind {
                BoundKind::Date => f.write_str("clustered:date"),
                BoundKind::ObjectIdTimestamp => f.write_str("clustered:objectid"),
            },
        }
    }
}

/// One expiration rule attached to a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlSpec {
    pub collection_id: CollectionId,
    /// Name at registration time. Renames are picked up by re-resolving the
    /// id each time the rule is processed.
    pub namespace: Namespace,
    pub strategy: TtlStrategy,
    pub expire_after_seconds: u64,
}

impl TtlSpec {
    pub fn index(
        collection_id: CollectionId,
        namespace: impl Into<Namespace>,
        index_name: impl Into<String>,
        expire_after_seconds: u64,
    ) -> Self {
        Self {
            collection_id,
            namespace: namespace.into(),
            strategy: TtlStrategy::IndexBased {
                index_name: index_name.into(),
            },
            expire_after_seconds,
        }
    }

    pub fn clustered(
        collection_id: CollectionId,
        namespace: impl Into<Namespace>,
        bound_kind: BoundKind,
        expire_after_seconds: u64,
    ) -> Self {
        Self {
            collection_id,
            namespace: namespace.into(),
            strategy: TtlStrategy::ClusteredScan { bound_kind },
            expire_after_seconds,
        }
    }

    /// Documents stamped at or before the returned time are expired.
    /// Saturates to the earliest representable time instead of overflowing.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.expire_after_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|delta| now.checked_sub_signed(delta))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Two specs occupy the same slot when they target the same collection
    /// and the same index, or are both the clustered rule.
    pub fn same_slot(&self, other: &TtlSpec) -> bool {
        if self.collection_id != other.collection_id {
            return false;
        }
        match (&self.strategy, &other.strategy) {
            (
                TtlStrategy::IndexBased { index_name: a },
                TtlStrategy::IndexBased { index_name: b },
            ) => a == b,
            (TtlStrategy::ClusteredScan { .. }, TtlStrategy::ClusteredScan { .. }) => true,
            _ => false,
        }
    }
}
