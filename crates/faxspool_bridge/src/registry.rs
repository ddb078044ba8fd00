//! Job Registry
//!
//! In-memory index of submitted outbound jobs, keyed both by the legacy
//! job identifier (used for sentinel naming) and by the transport's remote
//! job identifier (used to correlate delivery notifications).
//!
//! Locks are held only for the map operation itself, never across I/O.

use chrono::{DateTime, Utc};
use faxspool_ids::{LegacyJobId, RemoteJobId};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound fax accepted by the transport.
#[derive(Debug, Clone)]
pub struct Job {
    pub legacy_id: LegacyJobId,
    pub remote_id: RemoteJobId,
    pub fax_number: String,
    pub document_path: PathBuf,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    /// Serializes sentinel writes for this job between the submitter and
    /// the matcher.
    pub sentinel_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Job {
    pub fn new(
        legacy_id: LegacyJobId,
        remote_id: RemoteJobId,
        fax_number: impl Into<String>,
        document_path: impl Into<PathBuf>,
    ) -> Self {
        let now = Utc::now();
        Self {
            legacy_id,
            remote_id,
            fax_number: fax_number.into(),
            document_path: document_path.into(),
            status: JobStatus::Submitted,
            submitted_at: now,
            last_updated_at: now,
            sentinel_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Remote job id already registered: {0}")]
    DuplicateRemoteId(RemoteJobId),

    #[error("Legacy job id already registered: {0}")]
    DuplicateLegacyId(LegacyJobId),
}

#[derive(Default)]
struct RegistryInner {
    jobs: HashMap<LegacyJobId, Job>,
    by_remote: HashMap<RemoteJobId, LegacyJobId>,
}

impl RegistryInner {
    fn legacy_for(&self, remote: &RemoteJobId) -> Option<&LegacyJobId> {
        self.by_remote.get(remote)
    }
}

/// Thread-safe job index.
#[derive(Default)]
pub struct JobRegistry {
    inner: RwLock<RegistryInner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Mutations are pairs of infallible map operations; a poisoned guard
    // still sees consistent maps.
    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a job under both identifiers.
    pub fn insert(&self, job: Job) -> Result<(), RegistryError> {
        let mut inner = self.write();
        if inner.by_remote.contains_key(&job.remote_id) {
            return Err(RegistryError::DuplicateRemoteId(job.remote_id));
        }
        if inner.jobs.contains_key(&job.legacy_id) {
            return Err(RegistryError::DuplicateLegacyId(job.legacy_id));
        }
        inner
            .by_remote
            .insert(job.remote_id.clone(), job.legacy_id.clone());
        inner.jobs.insert(job.legacy_id.clone(), job);
        Ok(())
    }

    pub fn get_by_legacy(&self, legacy: &LegacyJobId) -> Option<Job> {
        self.read().jobs.get(legacy).cloned()
    }

    pub fn get_by_remote(&self, remote: &RemoteJobId) -> Option<Job> {
        let inner = self.read();
        let legacy = inner.legacy_for(remote)?;
        inner.jobs.get(legacy).cloned()
    }

    /// Record a non-terminal status. Terminal jobs are left untouched.
    pub fn update_status(&self, remote: &RemoteJobId, status: JobStatus) -> Option<Job> {
        let mut inner = self.write();
        let legacy = inner.legacy_for(remote)?.clone();
        let job = inner.jobs.get_mut(&legacy)?;
        if job.status.is_terminal() {
            return None;
        }
        job.status = status;
        job.last_updated_at = Utc::now();
        Some(job.clone())
    }

    /// Atomically move a live job to a terminal status.
    ///
    /// Returns the job only to the first caller; later callers (duplicate
    /// notifications) get `None`.
    pub fn claim_terminal(&self, remote: &RemoteJobId, status: JobStatus) -> Option<Job> {
        debug_assert!(status.is_terminal());
        let mut inner = self.write();
        let legacy = inner.legacy_for(remote)?.clone();
        let job = inner.jobs.get_mut(&legacy)?;
        if job.status.is_terminal() {
            return None;
        }
        job.status = status;
        job.last_updated_at = Utc::now();
        Some(job.clone())
    }

    pub fn remove(&self, legacy: &LegacyJobId) -> Option<Job> {
        let mut inner = self.write();
        let job = inner.jobs.remove(legacy)?;
        inner.by_remote.remove(&job.remote_id);
        Some(job)
    }

    pub fn len(&self) -> usize {
        self.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.read().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        jobs
    }
}
