//! Spool engine
//!
//! Owns the correlator, registry and the three workers that act on them
//! (submitter, matcher, inbound materializer). The watcher loop, the HTTP
//! handlers and the retention sweeper all share one `Arc<SpoolEngine>`.

use crate::correlator::{Correlation, Correlator, PendingArtifact};
use crate::inbound::InboundMaterializer;
use crate::matcher::NotificationMatcher;
use crate::metrics::{Metrics, METRICS};
use crate::registry::JobRegistry;
use crate::spool::SpoolDir;
use crate::submitter::JobSubmitter;
use crate::transport::FaxTransport;
use crate::watcher::SpoolEvent;
use chrono::{DateTime, Utc};
use faxspool_ids::{IdParseError, LegacyJobId, RemoteJobId, SessionSequence};
use faxspool_protocol::defaults::DESCRIPTOR_EXTENSION;
use faxspool_protocol::{classify_file, CorrelationField, Descriptor, FileRole, ProtocolError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Failed to read descriptor {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Descriptor {path} has an invalid name: {source}")]
    InvalidName { path: PathBuf, source: IdParseError },

    #[error("Malformed descriptor {path}: {source}")]
    Malformed { path: PathBuf, source: ProtocolError },
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub caller_number: String,
    pub document_extensions: Vec<String>,
    pub correlation_field: CorrelationField,
    pub retention: Duration,
}

/// What happened to one spool event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Ignored,
    Rejected,
    Cached,
    Submitted(RemoteJobId),
    SubmitFailed,
}

pub struct SpoolEngine<T> {
    spool: SpoolDir,
    settings: EngineSettings,
    correlator: Correlator,
    registry: Arc<JobRegistry>,
    submitter: JobSubmitter<T>,
    matcher: NotificationMatcher,
    inbound: InboundMaterializer,
}

impl<T: FaxTransport> SpoolEngine<T> {
    pub fn new(spool: SpoolDir, transport: T, settings: EngineSettings) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let submitter = JobSubmitter::new(
            transport,
            spool.clone(),
            Arc::clone(&registry),
            settings.caller_number.clone(),
        );
        let matcher = NotificationMatcher::new(
            spool.clone(),
            Arc::clone(&registry),
            settings.correlation_field,
        );
        let inbound = InboundMaterializer::new(spool.clone(), Arc::new(SessionSequence::new()));
        Self {
            spool,
            settings,
            correlator: Correlator::new(),
            registry,
            submitter,
            matcher,
            inbound,
        }
    }

    pub fn spool(&self) -> &SpoolDir {
        &self.spool
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn submitter(&self) -> &JobSubmitter<T> {
        &self.submitter
    }

    pub fn matcher(&self) -> &NotificationMatcher {
        &self.matcher
    }

    pub fn inbound(&self) -> &InboundMaterializer {
        &self.inbound
    }

    pub async fn handle_event(&self, event: &SpoolEvent) -> EventOutcome {
        self.handle_path(&event.path).await
    }

    /// Classify one spool file and feed it to the correlator. A completed
    /// pair is submitted before returning.
    pub async fn handle_path(&self, path: &Path) -> EventOutcome {
        let correlation = match classify_file(path, &self.settings.document_extensions) {
            FileRole::Ignored => return EventOutcome::Ignored,
            FileRole::Descriptor => {
                Metrics::inc(&METRICS.descriptors_seen);
                let (legacy_id, descriptor) = match read_descriptor(path).await {
                    Ok(parsed) => parsed,
                    Err(DescriptorError::Read { path, source }) => {
                        warn!(path = %path.display(), "Skipping unreadable descriptor: {}", source);
                        return EventOutcome::Ignored;
                    }
                    Err(err) => {
                        Metrics::inc(&METRICS.malformed_descriptors);
                        warn!("{}", err);
                        return EventOutcome::Rejected;
                    }
                };
                self.correlator.on_descriptor(
                    path,
                    legacy_id,
                    descriptor.fax_number,
                    descriptor.document_name,
                )
            }
            FileRole::Document => {
                Metrics::inc(&METRICS.documents_seen);
                let Some(key) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                    return EventOutcome::Ignored;
                };
                self.correlator.on_document(path, key)
            }
        };

        let pair = match correlation {
            Correlation::Paired(pair) => pair,
            Correlation::Cached { replaced } => {
                if replaced {
                    warn!(path = %path.display(), "Replaced a pending artifact with the same name");
                }
                debug!(path = %path.display(), "Waiting for complementary spool file");
                return EventOutcome::Cached;
            }
        };

        Metrics::inc(&METRICS.pairs_formed);
        info!(
            job = %pair.legacy_id,
            document = %pair.document_path.display(),
            "Descriptor paired with document"
        );
        match self
            .submitter
            .submit(&pair.fax_number, &pair.document_path, &pair.legacy_id)
            .await
        {
            Ok(remote_id) => EventOutcome::Submitted(remote_id),
            Err(_) => EventOutcome::SubmitFailed,
        }
    }

    /// Evict unpaired artifacts older than the retention window. Evicted
    /// descriptors get a `.fail` sentinel.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<PendingArtifact> {
        let evicted = self.correlator.evict_expired(now, self.settings.retention);
        for artifact in &evicted {
            Metrics::inc(&METRICS.artifacts_evicted);
            warn!(
                kind = artifact.kind(),
                key = %artifact.logical_key(),
                path = %artifact.local_path().display(),
                discovered_at = %artifact.discovered_at(),
                "Unpaired artifact evicted"
            );
            if let PendingArtifact::Descriptor(descriptor) = artifact {
                if let Err(err) = self.spool.write_fail(&descriptor.legacy_id).await {
                    error!(job = %descriptor.legacy_id, "Failed to write fail sentinel: {}", err);
                }
            }
        }
        evicted
    }

    pub fn retention(&self) -> Duration {
        self.settings.retention
    }
}

/// Read and parse a descriptor file, deriving the legacy job id from its
/// name.
pub async fn read_descriptor(path: &Path) -> Result<(LegacyJobId, Descriptor), DescriptorError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let legacy_id = LegacyJobId::from_descriptor_name(&file_name, DESCRIPTOR_EXTENSION).map_err(
        |source| DescriptorError::InvalidName {
            path: path.to_path_buf(),
            source,
        },
    )?;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DescriptorError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let descriptor = Descriptor::parse(&content).map_err(|source| DescriptorError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((legacy_id, descriptor))
}
