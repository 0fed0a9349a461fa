//! Index-Based Deletion
//!
//! Expires documents through a secondary index on a date field.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::pass::{SkipReason, SpecOutcome};
use crate::storage::{CollectionInfo, DeletionExecutor, RangeDelete, ScanTarget, Value};

/// Delete every document whose indexed date is at or before `cutoff`.
///
/// The scan is bracketed by two dates, so values of any other type stored
/// under the indexed field never match.
pub fn delete_expired_with_index(
    executor: &dyn DeletionExecutor,
    collection: &CollectionInfo,
    index_name: &str,
    cutoff: DateTime<Utc>,
) -> SpecOutcome {
    if collection.index(index_name).is_none() {
        debug!(
            namespace = %collection.namespace,
            index = index_name,
            "TTL index not found, skipping"
        );
        return SpecOutcome::Skipped(SkipReason::IndexMissing);
    }

    let request = RangeDelete {
        target: ScanTarget::Index(index_name.to_string()),
        lower: Value::Date(DateTime::<Utc>::MIN_UTC),
        upper: Value::Date(cutoff),
    };

    match executor.delete_range(collection.id, &request) {
        Ok(deleted) => SpecOutcome::Deleted(deleted),
        Err(e) if e.is_vanished() => {
            debug!(namespace = %collection.namespace, index = index_name, error = %e, "TTL target vanished");
            SpecOutcome::Skipped(SkipReason::from_vanished(&e))
        }
        Err(e) => SpecOutcome::Failed(e),
    }
}
