//! Metrics Module for Observability
//!
//! In-memory counters for the bridge, rendered in Prometheus exposition
//! format at `/metrics`. All fields are atomics; no locks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // Spool events
    pub descriptors_seen: AtomicU64,
    pub documents_seen: AtomicU64,
    pub malformed_descriptors: AtomicU64,
    pub pairs_formed: AtomicU64,
    pub artifacts_evicted: AtomicU64,

    // Outbound jobs
    pub jobs_submitted: AtomicU64,
    pub submit_failures: AtomicU64,
    pub jobs_completed: AtomicU64,
    pub jobs_failed: AtomicU64,

    // Callbacks
    pub notifications_received: AtomicU64,
    pub notifications_unmatched: AtomicU64,
    pub inbound_received: AtomicU64,
    pub inbound_failures: AtomicU64,

    // Filesystem
    pub spool_write_errors: AtomicU64,

    // Timing (cumulative microseconds)
    pub submit_time_us: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            descriptors_seen: AtomicU64::new(0),
            documents_seen: AtomicU64::new(0),
            malformed_descriptors: AtomicU64::new(0),
            pairs_formed: AtomicU64::new(0),
            artifacts_evicted: AtomicU64::new(0),
            jobs_submitted: AtomicU64::new(0),
            submit_failures: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            notifications_received: AtomicU64::new(0),
            notifications_unmatched: AtomicU64::new(0),
            inbound_received: AtomicU64::new(0),
            inbound_failures: AtomicU64::new(0),
            spool_write_errors: AtomicU64::new(0),
            submit_time_us: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_by(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Record submit round-trip timing in microseconds
    #[inline]
    pub fn record_submit_time(&self, start: Instant) {
        let elapsed_us = start.elapsed().as_micros() as u64;
        self.submit_time_us.fetch_add(elapsed_us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            descriptors_seen: self.descriptors_seen.load(Ordering::Relaxed),
            documents_seen: self.documents_seen.load(Ordering::Relaxed),
            malformed_descriptors: self.malformed_descriptors.load(Ordering::Relaxed),
            pairs_formed: self.pairs_formed.load(Ordering::Relaxed),
            artifacts_evicted: self.artifacts_evicted.load(Ordering::Relaxed),
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            submit_failures: self.submit_failures.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            notifications_received: self.notifications_received.load(Ordering::Relaxed),
            notifications_unmatched: self.notifications_unmatched.load(Ordering::Relaxed),
            inbound_received: self.inbound_received.load(Ordering::Relaxed),
            inbound_failures: self.inbound_failures.load(Ordering::Relaxed),
            spool_write_errors: self.spool_write_errors.load(Ordering::Relaxed),
            submit_time_us: self.submit_time_us.load(Ordering::Relaxed),
        }
    }

    /// Format as Prometheus exposition format
    pub fn prometheus_format(&self) -> String {
        let s = self.snapshot();
        let counters: [(&str, &str, u64); 15] = [
            ("faxspool_descriptors_seen_total", "Descriptor files observed", s.descriptors_seen),
            ("faxspool_documents_seen_total", "Document files observed", s.documents_seen),
            (
                "faxspool_malformed_descriptors_total",
                "Descriptor files rejected as malformed",
                s.malformed_descriptors,
            ),
            ("faxspool_pairs_formed_total", "Descriptor/document pairs formed", s.pairs_formed),
            (
                "faxspool_artifacts_evicted_total",
                "Unpaired artifacts evicted after the retention window",
                s.artifacts_evicted,
            ),
            ("faxspool_jobs_submitted_total", "Jobs accepted by the transport", s.jobs_submitted),
            ("faxspool_submit_failures_total", "Jobs the transport rejected", s.submit_failures),
            ("faxspool_jobs_completed_total", "Jobs completed successfully", s.jobs_completed),
            ("faxspool_jobs_failed_total", "Jobs reported failed", s.jobs_failed),
            (
                "faxspool_notifications_received_total",
                "Delivery notification entries received",
                s.notifications_received,
            ),
            (
                "faxspool_notifications_unmatched_total",
                "Notification entries with no matching job",
                s.notifications_unmatched,
            ),
            ("faxspool_inbound_received_total", "Inbound faxes materialized", s.inbound_received),
            ("faxspool_inbound_failures_total", "Inbound faxes rejected", s.inbound_failures),
            (
                "faxspool_spool_write_errors_total",
                "Failed writes into the spool directory",
                s.spool_write_errors,
            ),
            (
                "faxspool_submit_time_microseconds_total",
                "Cumulative submit round-trip time in microseconds",
                s.submit_time_us,
            ),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n\n"
            ));
        }
        out
    }
}

/// Immutable snapshot of metrics for reading
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub descriptors_seen: u64,
    pub documents_seen: u64,
    pub malformed_descriptors: u64,
    pub pairs_formed: u64,
    pub artifacts_evicted: u64,
    pub jobs_submitted: u64,
    pub submit_failures: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub notifications_received: u64,
    pub notifications_unmatched: u64,
    pub inbound_received: u64,
    pub inbound_failures: u64,
    pub spool_write_errors: u64,
    pub submit_time_us: u64,
}

impl MetricsSnapshot {
    /// Average submit round trip in milliseconds
    pub fn avg_submit_time_ms(&self) -> f64 {
        let attempts = self.jobs_submitted + self.submit_failures;
        if attempts == 0 {
            0.0
        } else {
            (self.submit_time_us as f64 / attempts as f64) / 1000.0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Jobs: {} submitted, {} completed, {} failed, {} rejected | \
             Inbound: {} received | Unpaired evicted: {} | Avg submit: {:.2}ms",
            self.jobs_submitted,
            self.jobs_completed,
            self.jobs_failed,
            self.submit_failures,
            self.inbound_received,
            self.artifacts_evicted,
            self.avg_submit_time_ms(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();
        Metrics::inc(&metrics.jobs_submitted);
        Metrics::inc(&metrics.jobs_submitted);
        Metrics::inc(&metrics.jobs_completed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_submitted, 2);
        assert_eq!(snapshot.jobs_completed, 1);
    }

    #[test]
    fn test_avg_submit_time() {
        let metrics = Metrics::new();
        Metrics::inc(&metrics.jobs_submitted);
        Metrics::inc_by(&metrics.submit_time_us, 3_000);
        assert!((metrics.snapshot().avg_submit_time_ms() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        Metrics::inc(&metrics.inbound_received);
        let output = metrics.prometheus_format();
        assert!(output.contains("faxspool_inbound_received_total 1"));
        assert!(output.contains("# TYPE faxspool_jobs_failed_total counter"));
    }
}
