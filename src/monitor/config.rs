//! Monitor Configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::storage::CollectionInfo;

/// Default time between the start of consecutive passes
pub const DEFAULT_PASS_INTERVAL: Duration = Duration::from_secs(60);

/// Predicate answering whether a collection is currently ineligible for
/// TTL deletion
pub type ExclusionFn = Arc<dyn Fn(&CollectionInfo) -> bool + Send + Sync>;

/// Named exclusion predicate
#[derive(Clone)]
pub struct Exclusion {
    name: String,
    check: ExclusionFn,
}

impl Exclusion {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&CollectionInfo) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Temporary target collection of an in-progress resharding
    pub fn resharding_temporary() -> Self {
        Self::new("resharding-temporary", |info| {
            info.resharding_temporary || info.namespace.coll().starts_with("system.resharding.")
        })
    }

    /// Collection dropped but not yet reclaimed
    pub fn drop_pending() -> Self {
        Self::new("drop-pending", |info| {
            info.drop_pending || info.namespace.coll().starts_with("system.drop.")
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn excludes(&self, info: &CollectionInfo) -> bool {
        (self.check)(info)
    }
}

impl fmt::Debug for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exclusion").field("name", &self.name).finish()
    }
}

/// TTL monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between the start of consecutive passes
    pub pass_interval: Duration,

    /// When false the thread keeps running but every pass is a no-op
    pub enabled: bool,

    /// Collections matching any of these are skipped
    pub exclusions: Vec<Exclusion>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            pass_interval: DEFAULT_PASS_INTERVAL,
            enabled: true,
            exclusions: vec![Exclusion::resharding_temporary(), Exclusion::drop_pending()],
        }
    }
}

impl MonitorConfig {
    /// Set pass interval
    pub fn with_pass_interval(mut self, interval: Duration) -> Self {
        self.pass_interval = interval;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Add an exclusion predicate
    pub fn with_exclusion(mut self, exclusion: Exclusion) -> Self {
        self.exclusions.push(exclusion);
        self
    }
}

/// First exclusion in `exclusions` that applies to `info`
pub(crate) fn matching_exclusion<'a>(
    exclusions: &'a [Exclusion],
    info: &CollectionInfo,
) -> Option<&'a Exclusion> {
    exclusions.iter().find(|e| e.excludes(info))
}
