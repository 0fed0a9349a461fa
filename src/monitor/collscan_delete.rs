//! Clustered Collection Deletion
//!
//! Expires documents with a bounded scan over the clustering key. General
//! purpose clustered collections are keyed by date; time-bucketed
//! collections are keyed by ObjectIds carrying their creation time.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::pass::{SkipReason, SpecOutcome};
use crate::catalog::BoundKind;
use crate::storage::{
    CollectionInfo, DeletionExecutor, ObjectId, RangeDelete, ScanTarget, Value,
};

/// Clustering-key range holding every record expired at `cutoff`, or
/// `None` when no key of that kind can be old enough.
pub fn expired_key_range(bound_kind: BoundKind, cutoff: DateTime<Utc>) -> Option<RangeDelete> {
    let (lower, upper) = match bound_kind {
        BoundKind::Date => (Value::Date(DateTime::<Utc>::MIN_UTC), Value::Date(cutoff)),
        BoundKind::ObjectIdTimestamp => {
            let secs = cutoff.timestamp();
            if secs < 0 {
                return None;
            }
            let secs = u32::try_from(secs).unwrap_or(u32::MAX);
            (
                Value::ObjectId(ObjectId::MIN),
                Value::ObjectId(ObjectId::max_for_timestamp(secs)),
            )
        }
    };

    Some(RangeDelete {
        target: ScanTarget::ClusteredKey,
        lower,
        upper,
    })
}

/// Delete every record whose clustering key is at or before `cutoff`
pub fn delete_expired_with_collscan(
    executor: &dyn DeletionExecutor,
    collection: &CollectionInfo,
    bound_kind: BoundKind,
    cutoff: DateTime<Utc>,
) -> SpecOutcome {
    if !collection.is_clustered() {
        debug!(namespace = %collection.namespace, "Collection is not clustered, skipping");
        return SpecOutcome::Skipped(SkipReason::NotClustered);
    }

    let Some(request) = expired_key_range(bound_kind, cutoff) else {
        return SpecOutcome::Deleted(0);
    };

    match executor.delete_range(collection.id, &request) {
        Ok(deleted) => SpecOutcome::Deleted(deleted),
        Err(e) if e.is_vanished() => {
            debug!(namespace = %collection.namespace, error = %e, "TTL target vanished");
            SpecOutcome::Skipped(SkipReason::from_vanished(&e))
        }
        Err(e) => SpecOutcome::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CollectionOptions, Document, MemoryEngine, ID_FIELD};
    use chrono::{TimeDelta, TimeZone};

    #[test]
    fn test_date_clustered() {
        let engine = MemoryEngine::new();
        let id = engine
            .create_collection("app.events", CollectionOptions::clustered())
            .unwrap();
        let now = Utc.timestamp_opt(2_000_000, 0).unwrap();

        for age in [10, 100, 1000] {
            engine
                .insert(id, Document::new().with(ID_FIELD, now - TimeDelta::seconds(age)))
                .unwrap();
        }

        let info = engine.lookup_collection(id).unwrap();
        let cutoff = now - TimeDelta::seconds(100);
        let outcome = delete_expired_with_collscan(&engine, &info, BoundKind::Date, cutoff);
        assert_eq!(outcome, SpecOutcome::Deleted(2));
        assert_eq!(engine.count(id), 1);
    }

    #[test]
    fn test_object_id_bound_covers_whole_second() {
        let cutoff = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let range = expired_key_range(BoundKind::ObjectIdTimestamp, cutoff).unwrap();

        let same_second = Value::ObjectId(ObjectId::new(1_700_000_000, u64::MAX - 1));
        let next_second = Value::ObjectId(ObjectId::min_for_timestamp(1_700_000_001));
        assert!(same_second <= range.upper);
        assert!(next_second > range.upper);
    }

    #[test]
    fn test_object_id_bound_before_epoch() {
        let cutoff = Utc.timestamp_opt(-5, 0).unwrap();
        assert!(expired_key_range(BoundKind::ObjectIdTimestamp, cutoff).is_none());
        assert!(expired_key_range(BoundKind::Date, cutoff).is_some());
    }

    #[test]
    fn test_object_id_bound_clamps() {
        let cutoff = Utc.timestamp_opt(i64::from(u32::MAX) + 10, 0).unwrap();
        let range = expired_key_range(BoundKind::ObjectIdTimestamp, cutoff).unwrap();
        assert_eq!(
            range.upper,
            Value::ObjectId(ObjectId::max_for_timestamp(u32::MAX))
        );
    }

    #[test]
    fn test_collection_dropped_after_lookup() {
        let engine = MemoryEngine::new();
        let id = engine
            .create_collection("app.events", CollectionOptions::clustered())
            .unwrap();
        let info = engine.lookup_collection(id).unwrap();
        engine.drop_collection(id).unwrap();

        let outcome = delete_expired_with_collscan(&engine, &info, BoundKind::Date, Utc::now());
        assert_eq!(outcome, SpecOutcome::Skipped(SkipReason::CollectionDropped));
    }

    #[test]
    fn test_not_clustered() {
        let engine = MemoryEngine::new();
        let id = engine
            .create_collection("app.plain", CollectionOptions::default())
            .unwrap();
        let info = engine.lookup_collection(id).unwrap();

        let outcome = delete_expired_with_collscan(&engine, &info, BoundKind::Date, Utc::now());
        assert_eq!(outcome, SpecOutcome::Skipped(SkipReason::NotClustered));
    }
}
