//! Notification Matcher
//!
//! Applies delivery-status callbacks to registered jobs. Each result entry
//! is handled on its own: an unknown or malformed entry is counted and
//! logged, and its siblings are still processed.

use crate::metrics::{Metrics, METRICS};
use crate::registry::{Job, JobRegistry, JobStatus};
use crate::spool::SpoolDir;
use faxspool_ids::RemoteJobId;
use faxspool_protocol::defaults::COMPLETED_MESSAGE;
use faxspool_protocol::{
    CorrelationField, DeliveryOutcome, DeliveryResult, NotificationPayload, NotifyResponse,
    StatusCode, StatusSentinel,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Counts returned for one notification payload.
pub type MatchReport = NotifyResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Matched,
    InProgress,
    Unmatched,
    Ignored,
}

pub struct NotificationMatcher {
    spool: SpoolDir,
    registry: Arc<JobRegistry>,
    correlation_field: CorrelationField,
}

impl NotificationMatcher {
    pub fn new(spool: SpoolDir, registry: Arc<JobRegistry>, correlation_field: CorrelationField) -> Self {
        Self {
            spool,
            registry,
            correlation_field,
        }
    }

    pub async fn on_notification(&self, payload: &NotificationPayload) -> MatchReport {
        if let Some(job) = &payload.job {
            debug!(aggregate = %job, "Notification aggregate result");
        }

        let mut report = MatchReport::default();
        for (key, entry) in payload.entries() {
            Metrics::inc(&METRICS.notifications_received);
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(key = %key, "Skipping malformed notification entry: {}", err);
                    report.ignored += 1;
                    continue;
                }
            };
            match self.process_entry(key, &entry).await {
                EntryOutcome::Matched => report.matched += 1,
                EntryOutcome::InProgress => report.in_progress += 1,
                EntryOutcome::Unmatched => {
                    Metrics::inc(&METRICS.notifications_unmatched);
                    report.unmatched += 1;
                }
                EntryOutcome::Ignored => report.ignored += 1,
            }
        }
        report
    }

    async fn process_entry(&self, key: &str, entry: &DeliveryResult) -> EntryOutcome {
        let Some(raw_id) = entry.correlation_id(self.correlation_field) else {
            warn!(
                key = %key,
                field = self.correlation_field.as_str(),
                "Notification entry has no correlation id"
            );
            return EntryOutcome::Ignored;
        };
        let remote_id = match RemoteJobId::parse(raw_id) {
            Ok(id) => id,
            Err(err) => {
                warn!(key = %key, "Notification entry has an invalid job id: {}", err);
                return EntryOutcome::Ignored;
            }
        };

        match entry.outcome() {
            DeliveryOutcome::Succeeded => {
                let Some(job) = self.registry.claim_terminal(&remote_id, JobStatus::Completed)
                else {
                    return unmatched(key, &remote_id);
                };
                let status = StatusSentinel::new(StatusCode::Completed, COMPLETED_MESSAGE)
                    .with_pages(entry.pages(), entry.pages());
                self.finish(&job, status, true).await;
                Metrics::inc(&METRICS.jobs_completed);
                info!(job = %job.legacy_id, remote = %remote_id, "Fax delivered");
                EntryOutcome::Matched
            }
            DeliveryOutcome::Failed { reason } => {
                let Some(job) = self.registry.claim_terminal(&remote_id, JobStatus::Failed) else {
                    return unmatched(key, &remote_id);
                };
                let status =
                    StatusSentinel::new(StatusCode::Completed, format!("Failed: {}", reason))
                        .with_pages(entry.pages(), entry.pages());
                self.finish(&job, status, false).await;
                Metrics::inc(&METRICS.jobs_failed);
                warn!(job = %job.legacy_id, remote = %remote_id, reason = %reason, "Fax delivery failed");
                EntryOutcome::Matched
            }
            DeliveryOutcome::InProgress { status } => {
                let Some(job) = self.registry.update_status(&remote_id, JobStatus::InProgress)
                else {
                    return unmatched(key, &remote_id);
                };
                let _guard = job.sentinel_lock.lock().await;
                // A terminal claim may have landed while we waited.
                if self
                    .registry
                    .get_by_legacy(&job.legacy_id)
                    .map_or(true, |current| current.status.is_terminal())
                {
                    return EntryOutcome::InProgress;
                }
                let sentinel = StatusSentinel::new(StatusCode::InProgress, status.clone())
                    .with_pages(entry.pages(), entry.pages());
                if let Err(err) = self.spool.write_status(&job.legacy_id, &sentinel).await {
                    error!(job = %job.legacy_id, "Failed to write progress sentinel: {}", err);
                }
                debug!(job = %job.legacy_id, status = %status, "Fax in progress");
                EntryOutcome::InProgress
            }
            DeliveryOutcome::Unknown => {
                warn!(key = %key, remote = %remote_id, "Notification entry has no recognisable outcome");
                EntryOutcome::Ignored
            }
        }
    }

    /// Terminal `.sts`, then `.done`/`.fail`, then drop the job.
    async fn finish(&self, job: &Job, status: StatusSentinel, success: bool) {
        {
            let _guard = job.sentinel_lock.lock().await;
            if let Err(err) = self.spool.write_status(&job.legacy_id, &status).await {
                error!(job = %job.legacy_id, "Failed to write terminal status: {}", err);
            }
            let marker = if success {
                self.spool.write_done(&job.legacy_id).await
            } else {
                self.spool.write_fail(&job.legacy_id).await
            };
            if let Err(err) = marker {
                error!(job = %job.legacy_id, "Failed to write completion marker: {}", err);
            }
        }
        self.registry.remove(&job.legacy_id);
    }
}

fn unmatched(key: &str, remote_id: &RemoteJobId) -> EntryOutcome {
    info!(key = %key, remote = %remote_id, "Notification for unknown job");
    EntryOutcome::Unmatched
}

#[cfg(test)]
mod tests {
    use super::*;
    use faxspool_ids::LegacyJobId;
    use tempfile::TempDir;

    fn setup() -> (NotificationMatcher, Arc<JobRegistry>, TempDir) {
        let temp = TempDir::new().unwrap();
        let spool = SpoolDir::open(temp.path(), "").unwrap();
        let registry = Arc::new(JobRegistry::new());
        let matcher = NotificationMatcher::new(spool, Arc::clone(&registry), CorrelationField::Uuid);
        (matcher, registry, temp)
    }

    fn register(registry: &JobRegistry, legacy: &str, remote: &str) {
        registry
            .insert(Job::new(
                LegacyJobId::parse(legacy).unwrap(),
                RemoteJobId::parse(remote).unwrap(),
                "+1555",
                "/q/doc.pdf",
            ))
            .unwrap();
    }

    fn payload(json: &str) -> NotificationPayload {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn success_writes_done_and_removes_job() {
        let (matcher, registry, temp) = setup();
        register(&registry, "job42", "abc-123");

        let report = matcher
            .on_notification(&payload(
                r#"{"results":{"x":{"uuid":"abc-123","result":{"success":true,"pages":2}}}}"#,
            ))
            .await;

        assert_eq!(report.matched, 1);
        assert!(temp.path().join("job42.done").exists());
        let sts = StatusSentinel::parse(
            &std::fs::read_to_string(temp.path().join("job42.sts")).unwrap(),
        )
        .unwrap();
        assert_eq!(sts.state, StatusCode::Completed);
        assert_eq!(sts.npages, 2);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn failure_writes_fail_with_reason() {
        let (matcher, registry, temp) = setup();
        register(&registry, "job7", "r7");

        matcher
            .on_notification(&payload(
                r#"{"results":{"x":{"uuid":"r7","result":{"success":false,"result_code":34,"result_text":"No answer"}}}}"#,
            ))
            .await;

        assert!(temp.path().join("job7.fail").exists());
        assert!(!temp.path().join("job7.done").exists());
        let sts = std::fs::read_to_string(temp.path().join("job7.sts")).unwrap();
        assert!(sts.contains("status:Failed: No answer (34)"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn duplicate_delivery_is_a_noop() {
        let (matcher, registry, temp) = setup();
        register(&registry, "job42", "abc-123");
        let body = payload(r#"{"results":{"x":{"uuid":"abc-123","result":{"success":true}}}}"#);

        assert_eq!(matcher.on_notification(&body).await.matched, 1);
        std::fs::remove_file(temp.path().join("job42.done")).unwrap();

        let second = matcher.on_notification(&body).await;
        assert_eq!(second.matched, 0);
        assert_eq!(second.unmatched, 1);
        assert!(!temp.path().join("job42.done").exists());
    }

    #[tokio::test]
    async fn unknown_entry_does_not_block_siblings() {
        let (matcher, registry, temp) = setup();
        register(&registry, "job42", "abc-123");

        let report = matcher
            .on_notification(&payload(
                r#"{"results":{
                    "a":{"uuid":"nobody","result":{"success":true}},
                    "b":{"result":{"success":true}},
                    "c":{"uuid":"abc-123","result":{"success":true}}
                }}"#,
            ))
            .await;

        assert_eq!(
            report,
            MatchReport {
                matched: 1,
                unmatched: 1,
                in_progress: 0,
                ignored: 1,
            }
        );
        assert!(temp.path().join("job42.done").exists());
    }

    #[tokio::test]
    async fn badly_typed_entry_does_not_block_siblings() {
        let (matcher, registry, temp) = setup();
        register(&registry, "job42", "abc-123");
        register(&registry, "job43", "zzz");

        let report = matcher
            .on_notification(&payload(
                r#"{"results":{
                    "a":{"uuid":"abc-123","result":{"success":true}},
                    "b":{"uuid":"zzz","result":{"success":null}},
                    "c":{"uuid":42,"result":{"success":true}}
                }}"#,
            ))
            .await;

        assert_eq!(report.matched, 1);
        assert_eq!(report.ignored, 2);
        assert!(temp.path().join("job42.done").exists());
        assert!(!temp.path().join("job43.done").exists());
        assert!(!temp.path().join("job43.fail").exists());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn progress_keeps_job_registered() {
        let (matcher, registry, temp) = setup();
        register(&registry, "job42", "abc-123");

        let report = matcher
            .on_notification(&payload(r#"{"results":{"x":{"uuid":"abc-123","status":"ringing"}}}"#))
            .await;

        assert_eq!(report.in_progress, 1);
        let sts = StatusSentinel::parse(
            &std::fs::read_to_string(temp.path().join("job42.sts")).unwrap(),
        )
        .unwrap();
        assert_eq!(sts.state, StatusCode::InProgress);
        assert_eq!(sts.status, "ringing");
        let job = registry
            .get_by_remote(&RemoteJobId::parse("abc-123").unwrap())
            .unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn call_uuid_correlation() {
        let temp = TempDir::new().unwrap();
        let spool = SpoolDir::open(temp.path(), "").unwrap();
        let registry = Arc::new(JobRegistry::new());
        let matcher =
            NotificationMatcher::new(spool, Arc::clone(&registry), CorrelationField::CallUuid);
        register(&registry, "job9", "call-9");

        let report = matcher
            .on_notification(&payload(
                r#"{"results":{"x":{"uuid":"other","call_uuid":"call-9","result":{"success":true}}}}"#,
            ))
            .await;
        assert_eq!(report.matched, 1);
        assert!(temp.path().join("job9.done").exists());
    }
}
