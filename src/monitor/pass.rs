//! TTL Pass
//!
//! One pass snapshots the expiration catalog and processes every entry
//! independently. Outcomes are folded into a report; one collection's
//! failure never ends the pass.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::collscan_delete::delete_expired_with_collscan;
use super::config::{matching_exclusion, Exclusion};
use super::error::ReaperError;
use super::index_delete::delete_expired_with_index;
use crate::catalog::{ExpirationCatalog, TtlSpec, TtlStrategy};
use crate::clock::{Clock, SystemClock};
use crate::storage::{DeletionExecutor, ExecutorError};

/// Why a specification was not processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Collection no longer exists
    CollectionDropped,
    /// TTL index no longer exists
    IndexMissing,
    /// Clustered rule on a collection that is not clustered
    NotClustered,
}

impl SkipReason {
    pub(crate) fn from_vanished(err: &ExecutorError) -> Self {
        match err {
            ExecutorError::IndexNotFound { .. } => SkipReason::IndexMissing,
            _ => SkipReason::CollectionDropped,
        }
    }

    /// The catalog entry points at something that is gone for good
    fn is_stale(&self) -> bool {
        matches!(self, SkipReason::CollectionDropped | SkipReason::IndexMissing)
    }
}

/// Result of processing one specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecOutcome {
    Deleted(u64),
    Skipped(SkipReason),
    /// Name of the exclusion that matched
    Excluded(String),
    Failed(ExecutorError),
}

/// Outcome of a complete pass
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub outcomes: Vec<(TtlSpec, SpecOutcome)>,
    pub duration: Duration,
}

impl PassReport {
    pub fn visited(&self) -> usize {
        self.outcomes.len()
    }

    pub fn deleted(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|(_, o)| match o {
                SpecOutcome::Deleted(n) => *n,
                _ => 0,
            })
            .sum()
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, SpecOutcome::Skipped(_)))
    }

    pub fn excluded(&self) -> usize {
        self.count(|o| matches!(o, SpecOutcome::Excluded(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SpecOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&SpecOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Collaborators a pass runs against
#[derive(Clone)]
pub struct MonitorDeps {
    pub catalog: Arc<dyn ExpirationCatalog>,
    pub executor: Arc<dyn DeletionExecutor>,
    pub clock: Arc<dyn Clock>,
}

impl MonitorDeps {
    pub fn new(catalog: Arc<dyn ExpirationCatalog>, executor: Arc<dyn DeletionExecutor>) -> Self {
        Self {
            catalog,
            executor,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Pass controller
pub struct TtlPass {
    deps: MonitorDeps,
    exclusions: Vec<Exclusion>,
}

impl TtlPass {
    pub fn new(deps: MonitorDeps, exclusions: Vec<Exclusion>) -> Self {
        Self { deps, exclusions }
    }

    /// Run one pass over a fresh catalog snapshot. Only a failure to take
    /// the snapshot is returned as an error.
    pub fn run(&self) -> Result<PassReport, ReaperError> {
        let start = Instant::now();
        let snapshot = self.deps.catalog.snapshot()?;
        debug!(specs = snapshot.len(), "Starting TTL pass");

        let outcomes = snapshot.into_iter().fold(Vec::new(), |mut acc, spec| {
            let outcome = self.process(&spec);
            acc.push((spec, outcome));
            acc
        });

        let report = PassReport {
            outcomes,
            duration: start.elapsed(),
        };

        if report.deleted() > 0 || report.failed() > 0 {
            info!(
                visited = report.visited(),
                deleted = report.deleted(),
                skipped = report.skipped(),
                failed = report.failed(),
                elapsed_ms = report.duration.as_millis() as u64,
                "TTL pass complete"
            );
        } else {
            debug!(
                visited = report.visited(),
                skipped = report.skipped(),
                excluded = report.excluded(),
                elapsed_ms = report.duration.as_millis() as u64,
                "TTL pass complete"
            );
        }

        Ok(report)
    }

    fn process(&self, spec: &TtlSpec) -> SpecOutcome {
        let outcome = self.process_inner(spec);

        match &outcome {
            SpecOutcome::Skipped(reason) if reason.is_stale() => {
                self.deps
                    .catalog
                    .deregister(spec.collection_id, &spec.strategy);
            }
            SpecOutcome::Failed(e) => {
                warn!(
                    collection = %spec.collection_id,
                    namespace = %spec.namespace,
                    strategy = %spec.strategy,
                    error = %e,
                    "TTL deletion failed"
                );
            }
            _ => {}
        }

        outcome
    }

    fn process_inner(&self, spec: &TtlSpec) -> SpecOutcome {
        let Some(collection) = self.deps.executor.lookup_collection(spec.collection_id) else {
            debug!(collection = %spec.collection_id, namespace = %spec.namespace, "Collection dropped, skipping");
            return SpecOutcome::Skipped(SkipReason::CollectionDropped);
        };

        if let Some(exclusion) = matching_exclusion(&self.exclusions, &collection) {
            trace!(namespace = %collection.namespace, exclusion = exclusion.name(), "Collection excluded from TTL");
            return SpecOutcome::Excluded(exclusion.name().to_string());
        }

        let cutoff = spec.cutoff(self.deps.clock.now());
        let executor = self.deps.executor.as_ref();

        match &spec.strategy {
            TtlStrategy::IndexBased { index_name } => {
                delete_expired_with_index(executor, &collection, index_name, cutoff)
            }
            TtlStrategy::ClusteredScan { bound_kind } => {
                delete_expired_with_collscan(executor, &collection, *bound_kind, cutoff)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BoundKind, CatalogError, TtlCollectionCache};
    use crate::clock::ManualClock;
    use crate::storage::{
        CollectionId, CollectionInfo, CollectionOptions, Document, MemoryEngine, ObjectId,
        RangeDelete, ID_FIELD,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use parking_lot::Mutex;
    use std::collections::HashSet;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    struct Fixture {
        engine: Arc<MemoryEngine>,
        cache: Arc<TtlCollectionCache>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: Arc::new(MemoryEngine::new()),
                cache: Arc::new(TtlCollectionCache::new()),
                clock: Arc::new(ManualClock::new(now())),
            }
        }

        fn pass(&self) -> TtlPass {
            let deps = MonitorDeps::new(self.cache.clone(), self.engine.clone())
                .with_clock(self.clock.clone());
            TtlPass::new(
                deps,
                vec![Exclusion::resharding_temporary(), Exclusion::drop_pending()],
            )
        }

        fn indexed(&self, ns: &str, expire_after: u64) -> CollectionId {
            let id = self
                .engine
                .create_collection(ns, CollectionOptions::default())
                .unwrap();
            self.engine.create_index(id, "expireAt_1", "expireAt").unwrap();
            self.cache
                .register(TtlSpec::index(id, ns, "expireAt_1", expire_after));
            id
        }

        fn insert_aged(&self, id: CollectionId, age_secs: i64) -> crate::storage::Value {
            self.engine
                .insert(
                    id,
                    Document::new().with("expireAt", now() - TimeDelta::seconds(age_secs)),
                )
                .unwrap()
        }
    }

    #[test]
    fn test_index_scenario() {
        let fx = Fixture::new();
        let id = fx.indexed("app.c", 60);
        let old = fx.insert_aged(id, 120);
        let fresh = fx.insert_aged(id, 30);

        let report = fx.pass().run().unwrap();
        assert_eq!(report.visited(), 1);
        assert_eq!(report.deleted(), 1);
        assert!(fx.engine.find(id, &old).is_none());
        assert!(fx.engine.find(id, &fresh).is_some());
    }

    #[test]
    fn test_document_deleted_only_once_expired() {
        let fx = Fixture::new();
        let id = fx.indexed("app.c", 60);
        let doc = fx.insert_aged(id, 0);

        let pass = fx.pass();
        fx.clock.advance(TimeDelta::seconds(59));
        pass.run().unwrap();
        assert!(fx.engine.find(id, &doc).is_some());

        fx.clock.advance(TimeDelta::seconds(1));
        let report = pass.run().unwrap();
        assert_eq!(report.deleted(), 1);
        assert!(fx.engine.find(id, &doc).is_none());
    }

    #[test]
    fn test_time_bucket_scenario() {
        let fx = Fixture::new();
        let id = fx
            .engine
            .create_collection("app.system.buckets.weather", CollectionOptions::time_series())
            .unwrap();
        fx.cache.register(TtlSpec::clustered(
            id,
            "app.system.buckets.weather",
            BoundKind::ObjectIdTimestamp,
            3600,
        ));

        let ts = now().timestamp() as u32;
        let old = fx
            .engine
            .insert(id, Document::new().with(ID_FIELD, ObjectId::new(ts - 7200, 1)))
            .unwrap();
        let recent = fx
            .engine
            .insert(id, Document::new().with(ID_FIELD, ObjectId::new(ts - 60, 2)))
            .unwrap();

        let report = fx.pass().run().unwrap();
        assert_eq!(report.deleted(), 1);
        assert!(fx.engine.find(id, &old).is_none());
        assert!(fx.engine.find(id, &recent).is_some());
    }

    #[test]
    fn test_dropped_index_does_not_abort_pass() {
        let fx = Fixture::new();
        let a = fx.indexed("app.a", 60);
        let b = fx.indexed("app.b", 60);
        fx.insert_aged(a, 120);
        fx.insert_aged(b, 120);
        fx.engine.drop_index(a, "expireAt_1").unwrap();

        let report = fx.pass().run().unwrap();
        assert_eq!(report.visited(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.deleted(), 1);
        assert_eq!(fx.engine.count(b), 0);

        // The stale entry is pruned from the catalog
        assert_eq!(fx.cache.len(), 1);
    }

    #[test]
    fn test_dropped_collection_is_skipped() {
        let fx = Fixture::new();
        let a = fx.indexed("app.a", 60);
        fx.engine.drop_collection(a).unwrap();

        let report = fx.pass().run().unwrap();
        assert_eq!(
            report.outcomes[0].1,
            SpecOutcome::Skipped(SkipReason::CollectionDropped)
        );
        assert!(fx.cache.is_empty());
    }

    #[test]
    fn test_renamed_collection_resolved_by_id() {
        let fx = Fixture::new();
        let id = fx.indexed("app.old", 60);
        fx.insert_aged(id, 120);
        fx.engine.rename_collection(id, "app.new").unwrap();

        let report = fx.pass().run().unwrap();
        assert_eq!(report.deleted(), 1);
    }

    #[test]
    fn test_resharding_exclusion_toggles() {
        let fx = Fixture::new();
        let id = fx.indexed("app.r", 60);
        fx.insert_aged(id, 120);
        fx.engine.set_resharding_temporary(id, true).unwrap();

        let pass = fx.pass();
        for _ in 0..3 {
            let report = pass.run().unwrap();
            assert_eq!(report.excluded(), 1);
            assert_eq!(fx.engine.count(id), 1);
        }

        fx.engine.set_resharding_temporary(id, false).unwrap();
        let report = pass.run().unwrap();
        assert_eq!(report.deleted(), 1);
        assert_eq!(fx.engine.count(id), 0);
    }

    #[test]
    fn test_drop_pending_excluded() {
        let fx = Fixture::new();
        let id = fx.indexed("app.d", 60);
        fx.insert_aged(id, 120);
        fx.engine.set_drop_pending(id, true).unwrap();

        let report = fx.pass().run().unwrap();
        assert_eq!(
            report.outcomes[0].1,
            SpecOutcome::Excluded("drop-pending".to_string())
        );
        assert_eq!(fx.engine.count(id), 1);
        // Exclusions keep their catalog entries
        assert_eq!(fx.cache.len(), 1);
    }

    /// Executor that fails deletions on selected collections
    struct FlakyExecutor {
        inner: MemoryEngine,
        failing: HashSet<CollectionId>,
        calls: Mutex<Vec<CollectionId>>,
    }

    impl DeletionExecutor for FlakyExecutor {
        fn lookup_collection(&self, id: CollectionId) -> Option<CollectionInfo> {
            self.inner.lookup_collection(id)
        }

        fn delete_range(
            &self,
            id: CollectionId,
            request: &RangeDelete,
        ) -> Result<u64, ExecutorError> {
            self.calls.lock().push(id);
            if self.failing.contains(&id) {
                let namespace = self.inner.lookup_collection(id).map(|info| info.namespace);
                return Err(ExecutorError::Execution {
                    namespace: namespace.unwrap_or_else(|| "unknown.unknown".into()),
                    reason: "write conflict".to_string(),
                });
            }
            self.inner.delete_range(id, request)
        }
    }

    #[test]
    fn test_failure_is_isolated() {
        let fx = Fixture::new();
        let a = fx.indexed("app.a", 60);
        let b = fx.indexed("app.b", 60);
        let c = fx.indexed("app.c", 60);
        for id in [a, b, c] {
            fx.insert_aged(id, 120);
        }

        let executor = Arc::new(FlakyExecutor {
            inner: (*fx.engine).clone(),
            failing: HashSet::from([b]),
            calls: Mutex::new(Vec::new()),
        });
        let deps = MonitorDeps::new(fx.cache.clone(), executor.clone()).with_clock(fx.clock.clone());
        let report = TtlPass::new(deps, Vec::new()).run().unwrap();

        assert_eq!(report.visited(), 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.deleted(), 2);
        assert_eq!(*executor.calls.lock(), vec![a, b, c]);
        // Failures are retried next pass, not deregistered
        assert_eq!(fx.cache.len(), 3);

        // Reports outlive the pass, failures included
        let kept = report.clone();
        assert_eq!(kept.outcomes, report.outcomes);
        assert!(matches!(
            kept.outcomes[1].1,
            SpecOutcome::Failed(ExecutorError::Execution { .. })
        ));
    }

    /// Executor that renames the collection between lookup and delete and
    /// hands its old name to a collection without any TTL rule
    struct RenamingExecutor {
        inner: MemoryEngine,
        renamed: AtomicBool,
        usurper: Mutex<Option<CollectionId>>,
    }

    impl DeletionExecutor for RenamingExecutor {
        fn lookup_collection(&self, id: CollectionId) -> Option<CollectionInfo> {
            let info = self.inner.lookup_collection(id)?;
            if !self.renamed.swap(true, Ordering::SeqCst) {
                self.inner.rename_collection(id, "app.moved").unwrap();
                let other = self
                    .inner
                    .create_collection(info.namespace.clone(), CollectionOptions::clustered())
                    .unwrap();
                self.inner
                    .insert(other, Document::new().with(ID_FIELD, now() - TimeDelta::seconds(500)))
                    .unwrap();
                *self.usurper.lock() = Some(other);
            }
            Some(info)
        }

        fn delete_range(
            &self,
            id: CollectionId,
            request: &RangeDelete,
        ) -> Result<u64, ExecutorError> {
            self.inner.delete_range(id, request)
        }
    }

    #[test]
    fn test_rename_between_lookup_and_delete() {
        let fx = Fixture::new();
        let id = fx
            .engine
            .create_collection("app.ttl", CollectionOptions::clustered())
            .unwrap();
        fx.engine
            .insert(id, Document::new().with(ID_FIELD, now() - TimeDelta::seconds(500)))
            .unwrap();
        fx.cache
            .register(TtlSpec::clustered(id, "app.ttl", BoundKind::Date, 60));

        let executor = Arc::new(RenamingExecutor {
            inner: (*fx.engine).clone(),
            renamed: AtomicBool::new(false),
            usurper: Mutex::new(None),
        });
        let deps = MonitorDeps::new(fx.cache.clone(), executor.clone()).with_clock(fx.clock.clone());
        let report = TtlPass::new(deps, Vec::new()).run().unwrap();

        assert_eq!(report.outcomes[0].1, SpecOutcome::Deleted(1));
        assert_eq!(fx.engine.count(id), 0);
        let other = executor.usurper.lock().unwrap();
        assert_eq!(fx.engine.count(other), 1);
        // The rule of the renamed collection survives
        assert_eq!(fx.cache.len(), 1);
    }

    /// Executor that registers a new rule while a deletion is running
    struct RegisteringExecutor {
        inner: MemoryEngine,
        cache: Arc<TtlCollectionCache>,
        late: TtlSpec,
    }

    impl DeletionExecutor for RegisteringExecutor {
        fn lookup_collection(&self, id: CollectionId) -> Option<CollectionInfo> {
            self.inner.lookup_collection(id)
        }

        fn delete_range(
            &self,
            id: CollectionId,
            request: &RangeDelete,
        ) -> Result<u64, ExecutorError> {
            self.cache.register(self.late.clone());
            self.inner.delete_range(id, request)
        }
    }

    #[test]
    fn test_rule_registered_mid_pass_waits_for_next_pass() {
        let fx = Fixture::new();
        let a = fx.indexed("app.a", 60);
        fx.insert_aged(a, 120);

        let b = fx
            .engine
            .create_collection("app.b", CollectionOptions::default())
            .unwrap();
        fx.engine.create_index(b, "expireAt_1", "expireAt").unwrap();
        fx.insert_aged(b, 120);

        let executor = Arc::new(RegisteringExecutor {
            inner: (*fx.engine).clone(),
            cache: fx.cache.clone(),
            late: TtlSpec::index(b, "app.b", "expireAt_1", 60),
        });
        let deps = MonitorDeps::new(fx.cache.clone(), executor).with_clock(fx.clock.clone());
        let pass = TtlPass::new(deps, Vec::new());

        let first = pass.run().unwrap();
        assert_eq!(first.visited(), 1);
        assert_eq!(fx.engine.count(b), 1);

        let second = pass.run().unwrap();
        assert_eq!(second.visited(), 2);
        assert_eq!(fx.engine.count(b), 0);
    }

    #[test]
    fn test_lock_timeout_is_isolated() {
        let engine = Arc::new(MemoryEngine::new().with_lock_timeout(Duration::from_millis(10)));
        let cache = Arc::new(TtlCollectionCache::new());
        let busy = engine
            .create_collection("app.busy", CollectionOptions::clustered())
            .unwrap();
        let idle = engine
            .create_collection("app.idle", CollectionOptions::clustered())
            .unwrap();
        for id in [busy, idle] {
            engine
                .insert(id, Document::new().with(ID_FIELD, now() - TimeDelta::seconds(500)))
                .unwrap();
        }
        cache.register(TtlSpec::clustered(busy, "app.busy", BoundKind::Date, 60));
        cache.register(TtlSpec::clustered(idle, "app.idle", BoundKind::Date, 60));

        let deps = MonitorDeps::new(cache.clone(), engine.clone())
            .with_clock(Arc::new(ManualClock::new(now())));
        let pass = TtlPass::new(deps, Vec::new());

        // Run the pass on another thread while this one holds the busy lock
        let report = engine
            .with_exclusive_lock(busy, || {
                std::thread::scope(|s| s.spawn(|| pass.run()).join().unwrap())
            })
            .unwrap()
            .unwrap();

        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.outcomes[0].1,
            SpecOutcome::Failed(ExecutorError::LockTimeout { .. })
        ));
        assert_eq!(engine.count(idle), 0);
        assert_eq!(engine.count(busy), 1);
    }

    struct BrokenCatalog;

    impl ExpirationCatalog for BrokenCatalog {
        fn snapshot(&self) -> Result<Vec<TtlSpec>, CatalogError> {
            Err(CatalogError::Unavailable("catalog offline".to_string()))
        }

        fn deregister(&self, _: CollectionId, _: &TtlStrategy) {}
    }

    #[test]
    fn test_snapshot_failure_aborts_pass() {
        let deps = MonitorDeps::new(Arc::new(BrokenCatalog), Arc::new(MemoryEngine::new()));
        let err = TtlPass::new(deps, Vec::new()).run().unwrap_err();
        assert!(matches!(err, ReaperError::Catalog(CatalogError::Unavailable(_))));
    }
}
