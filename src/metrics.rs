//! TTL Metrics
//!
//! Pass and deletion counters with pass latency tracking, exportable in
//! Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::monitor::PassReport;

/// Metrics collector for the TTL monitor
#[derive(Debug)]
pub struct TtlMetrics {
    /// Completed passes
    passes: AtomicU64,

    /// Passes abandoned because the catalog snapshot failed
    aborted_passes: AtomicU64,

    deleted_documents: AtomicU64,
    skipped_specs: AtomicU64,
    excluded_specs: AtomicU64,
    failed_specs: AtomicU64,

    /// Pass latency tracking
    latency_sum_us: AtomicU64,
    latency_min_us: AtomicU64,
    latency_max_us: AtomicU64,
}

impl Default for TtlMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlMetrics {
    pub fn new() -> Self {
        Self {
            passes: AtomicU64::new(0),
            aborted_passes: AtomicU64::new(0),
            deleted_documents: AtomicU64::new(0),
            skipped_specs: AtomicU64::new(0),
            excluded_specs: AtomicU64::new(0),
            failed_specs: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_min_us: AtomicU64::new(u64::MAX),
            latency_max_us: AtomicU64::new(0),
        }
    }

    /// Record a completed pass
    pub fn record_pass(&self, report: &PassReport) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.deleted_documents
            .fetch_add(report.deleted(), Ordering::Relaxed);
        self.skipped_specs
            .fetch_add(report.skipped() as u64, Ordering::Relaxed);
        self.excluded_specs
            .fetch_add(report.excluded() as u64, Ordering::Relaxed);
        self.failed_specs
            .fetch_add(report.failed() as u64, Ordering::Relaxed);
        self.record_latency(report.duration);
    }

    pub fn record_aborted_pass(&self) {
        self.aborted_passes.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency: Duration) {
        let latency_us = latency.as_micros() as u64;
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_min_us.fetch_min(latency_us, Ordering::Relaxed);
        self.latency_max_us.fetch_max(latency_us, Ordering::Relaxed);
    }

    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    pub fn aborted_passes(&self) -> u64 {
        self.aborted_passes.load(Ordering::Relaxed)
    }

    pub fn deleted_documents(&self) -> u64 {
        self.deleted_documents.load(Ordering::Relaxed)
    }

    pub fn skipped_specs(&self) -> u64 {
        self.skipped_specs.load(Ordering::Relaxed)
    }

    pub fn excluded_specs(&self) -> u64 {
        self.excluded_specs.load(Ordering::Relaxed)
    }

    pub fn failed_specs(&self) -> u64 {
        self.failed_specs.load(Ordering::Relaxed)
    }

    /// Get average pass latency in microseconds
    pub fn avg_pass_latency_us(&self) -> f64 {
        let count = self.passes();
        if count == 0 {
            return 0.0;
        }
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        sum as f64 / count as f64
    }

    pub fn min_pass_latency_us(&self) -> u64 {
        let min = self.latency_min_us.load(Ordering::Relaxed);
        if min == u64::MAX {
            0
        } else {
            min
        }
    }

    pub fn max_pass_latency_us(&self) -> u64 {
        self.latency_max_us.load(Ordering::Relaxed)
    }

    /// Get a summary of metrics
    pub fn summary(&self) -> String {
        format!(
            "Passes: {} | Deleted: {} | Failed specs: {} | Pass latency (µs): avg={:.1}, min={}, max={}",
            self.passes(),
            self.deleted_documents(),
            self.failed_specs(),
            self.avg_pass_latency_us(),
            self.min_pass_latency_us(),
            self.max_pass_latency_us()
        )
    }

    /// Export in Prometheus text format
    pub fn export(&self) -> String {
        let counters = [
            ("ttl_passes_total", "Completed TTL passes", self.passes()),
            (
                "ttl_aborted_passes_total",
                "TTL passes abandoned before processing",
                self.aborted_passes(),
            ),
            (
                "ttl_deleted_documents_total",
                "Documents deleted by the TTL monitor",
                self.deleted_documents(),
            ),
            (
                "ttl_skipped_specs_total",
                "TTL specs skipped because their target vanished",
                self.skipped_specs(),
            ),
            (
                "ttl_excluded_specs_total",
                "TTL specs skipped by an exclusion",
                self.excluded_specs(),
            ),
            (
                "ttl_failed_specs_total",
                "TTL specs whose deletion failed",
                self.failed_specs(),
            ),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        }
        output.push_str("# HELP ttl_pass_latency_max_us Slowest TTL pass in microseconds\n");
        output.push_str("# TYPE ttl_pass_latency_max_us gauge\n");
        output.push_str(&format!(
            "ttl_pass_latency_max_us {}\n",
            self.max_pass_latency_us()
        ));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TtlSpec;
    use crate::monitor::{SkipReason, SpecOutcome};
    use crate::storage::CollectionId;

    fn report(outcomes: Vec<SpecOutcome>, micros: u64) -> PassReport {
        PassReport {
            outcomes: outcomes
                .into_iter()
                .map(|o| (TtlSpec::index(CollectionId(1), "app.a", "t_1", 60), o))
                .collect(),
            duration: Duration::from_micros(micros),
        }
    }

    #[test]
    fn test_metrics() {
        let metrics = TtlMetrics::new();

        metrics.record_pass(&report(
            vec![
                SpecOutcome::Deleted(3),
                SpecOutcome::Skipped(SkipReason::IndexMissing),
            ],
            100,
        ));
        metrics.record_pass(&report(
            vec![
                SpecOutcome::Deleted(2),
                SpecOutcome::Excluded("drop-pending".to_string()),
            ],
            200,
        ));
        metrics.record_aborted_pass();

        assert_eq!(metrics.passes(), 2);
        assert_eq!(metrics.aborted_passes(), 1);
        assert_eq!(metrics.deleted_documents(), 5);
        assert_eq!(metrics.skipped_specs(), 1);
        assert_eq!(metrics.excluded_specs(), 1);
        assert_eq!(metrics.min_pass_latency_us(), 100);
        assert_eq!(metrics.max_pass_latency_us(), 200);
        assert!((metrics.avg_pass_latency_us() - 150.0).abs() < 0.1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = TtlMetrics::new();
        metrics.record_pass(&report(vec![SpecOutcome::Deleted(7)], 10));

        let output = metrics.export();
        assert!(output.contains("ttl_deleted_documents_total 7"));
        assert!(output.contains("# TYPE ttl_passes_total counter"));
        assert!(output.contains("ttl_pass_latency_max_us 10"));
    }
}
