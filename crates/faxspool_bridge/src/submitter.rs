//! Job Submitter
//!
//! Hands one paired job to the transport and records the outcome in the
//! spool. Sentinel order per job:
//!
//! 1. `<job>.jobid` before any network call
//! 2. `<job>.sts` (state 6) or `<job>.fail` after the call resolves

use crate::metrics::{Metrics, METRICS};
use crate::registry::{Job, JobRegistry, RegistryError};
use crate::spool::{SpoolDir, SpoolError};
use crate::transport::{FaxTransport, OutboundFax, TransportError};
use faxspool_ids::{IdParseError, LegacyJobId, RemoteJobId};
use faxspool_protocol::defaults::SENT_TO_TRANSPORT_MESSAGE;
use faxspool_protocol::{StatusCode, StatusSentinel};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Job {job} is still in flight as {remote}")]
    InFlight { job: LegacyJobId, remote: RemoteJobId },

    #[error("Could not claim job {job}: {source}")]
    Claim { job: LegacyJobId, source: SpoolError },

    #[error("Could not read document {path}: {source}")]
    DocumentRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Transport returned an unusable job id: {0}")]
    InvalidRemoteId(#[from] IdParseError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub struct JobSubmitter<T> {
    transport: T,
    spool: SpoolDir,
    registry: Arc<JobRegistry>,
    caller_number: String,
}

impl<T: FaxTransport> JobSubmitter<T> {
    pub fn new(
        transport: T,
        spool: SpoolDir,
        registry: Arc<JobRegistry>,
        caller_number: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            spool,
            registry,
            caller_number: caller_number.into(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Submit one job. On success the job is registered and the remote id
    /// returned; on any failure after the claim a `.fail` sentinel is left
    /// behind and nothing is registered.
    ///
    /// A legacy id that is still registered is refused up front and its
    /// sentinels are left alone.
    pub async fn submit(
        &self,
        fax_number: &str,
        document_path: &Path,
        legacy_id: &LegacyJobId,
    ) -> Result<RemoteJobId, SubmitError> {
        if let Some(live) = self.registry.get_by_legacy(legacy_id) {
            Metrics::inc(&METRICS.submit_failures);
            warn!(
                job = %legacy_id,
                remote = %live.remote_id,
                document = %document_path.display(),
                "Refusing to resubmit a job that is still in flight"
            );
            return Err(SubmitError::InFlight {
                job: legacy_id.clone(),
                remote: live.remote_id,
            });
        }

        self.spool
            .write_jobid(legacy_id)
            .await
            .map_err(|source| SubmitError::Claim {
                job: legacy_id.clone(),
                source,
            })?;

        let document = match tokio::fs::read(document_path).await {
            Ok(bytes) => bytes,
            Err(source) => {
                return Err(self
                    .fail(
                        legacy_id,
                        SubmitError::DocumentRead {
                            path: document_path.to_path_buf(),
                            source,
                        },
                    )
                    .await)
            }
        };

        let fax = OutboundFax {
            callee_number: fax_number.to_string(),
            caller_number: self.caller_number.clone(),
            document_name: document_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document.pdf".to_string()),
            document,
        };

        let start = Instant::now();
        let result = self.transport.submit(fax).await;
        METRICS.record_submit_time(start);

        let response = match result {
            Ok(response) => response,
            Err(err) => return Err(self.fail(legacy_id, err.into()).await),
        };
        let remote_id = match RemoteJobId::parse(response.job_uuid.trim()) {
            Ok(id) => id,
            Err(err) => return Err(self.fail(legacy_id, err.into()).await),
        };

        let job = Job::new(
            legacy_id.clone(),
            remote_id.clone(),
            fax_number,
            document_path,
        );
        let sentinel_lock = Arc::clone(&job.sentinel_lock);
        // Held until state 6 is on disk so a fast notification cannot write
        // its terminal status first.
        let _guard = sentinel_lock.lock().await;

        if let Err(err) = self.registry.insert(job) {
            // The id went live while this call was out; its sentinels belong
            // to the other job.
            Metrics::inc(&METRICS.submit_failures);
            error!(
                job = %legacy_id,
                remote = %remote_id,
                "Accepted fax could not be tracked: {}",
                err
            );
            return Err(err.into());
        }

        let status = StatusSentinel::new(StatusCode::SentToTransport, SENT_TO_TRANSPORT_MESSAGE);
        if let Err(err) = self.spool.write_status(legacy_id, &status).await {
            error!(job = %legacy_id, remote = %remote_id, "Failed to write status sentinel: {}", err);
        }

        Metrics::inc(&METRICS.jobs_submitted);
        info!(
            job = %legacy_id,
            remote = %remote_id,
            fax_number = %fax_number,
            "Fax submitted"
        );
        Ok(remote_id)
    }

    async fn fail(&self, legacy_id: &LegacyJobId, err: SubmitError) -> SubmitError {
        Metrics::inc(&METRICS.submit_failures);
        warn!(job = %legacy_id, "Submission failed: {}", err);
        if let Err(write_err) = self.spool.write_fail(legacy_id).await {
            error!(job = %legacy_id, "Failed to write fail sentinel: {}", write_err);
        }
        err
    }
}
