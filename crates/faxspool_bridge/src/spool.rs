//! Spool directory writer
//!
//! All writes into the spool directory go through [`SpoolDir`]. Each write
//! lands in a hidden temp file, is flushed to disk and then renamed into
//! place, so legacy pollers never observe a partially written sentinel.

use crate::metrics::{Metrics, METRICS};
use faxspool_protocol::{naming, LegacyJobId, ReceiptSentinel, StatusSentinel};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("Spool directory unavailable: {path}: {source}")]
    Unavailable { path: PathBuf, source: io::Error },

    #[error("Spool path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Spool write task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, SpoolError>;

/// Handle on the spool directory.
#[derive(Debug, Clone)]
pub struct SpoolDir {
    root: PathBuf,
    status_prefix: String,
}

impl SpoolDir {
    /// Open an existing spool directory. Fails if it is missing or not a
    /// directory.
    pub fn open(root: impl Into<PathBuf>, status_prefix: impl Into<String>) -> Result<Self> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(|source| SpoolError::Unavailable {
            path: root.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(SpoolError::NotADirectory(root));
        }
        Ok(Self {
            root,
            status_prefix: status_prefix.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub fn jobid_path(&self, job: &LegacyJobId) -> PathBuf {
        self.path_of(&naming::jobid_file_name(job))
    }

    pub fn status_path(&self, job: &LegacyJobId) -> PathBuf {
        self.path_of(&naming::status_file_name(&self.status_prefix, job))
    }

    pub fn done_path(&self, job: &LegacyJobId) -> PathBuf {
        self.path_of(&naming::done_file_name(job))
    }

    pub fn fail_path(&self, job: &LegacyJobId) -> PathBuf {
        self.path_of(&naming::fail_file_name(job))
    }

    /// `<job>.jobid` containing the legacy job identifier.
    pub async fn write_jobid(&self, job: &LegacyJobId) -> Result<PathBuf> {
        self.write_durable(self.jobid_path(job), job.as_str().as_bytes().to_vec())
            .await
    }

    pub async fn write_status(&self, job: &LegacyJobId, status: &StatusSentinel) -> Result<PathBuf> {
        self.write_durable(self.status_path(job), status.render().into_bytes())
            .await
    }

    pub async fn write_done(&self, job: &LegacyJobId) -> Result<PathBuf> {
        self.write_durable(self.done_path(job), Vec::new()).await
    }

    pub async fn write_fail(&self, job: &LegacyJobId) -> Result<PathBuf> {
        self.write_durable(self.fail_path(job), Vec::new()).await
    }

    pub async fn write_document(&self, file_name: &str, bytes: Vec<u8>) -> Result<PathBuf> {
        self.write_durable(self.path_of(file_name), bytes).await
    }

    pub async fn write_receipt(&self, file_name: &str, receipt: &ReceiptSentinel) -> Result<PathBuf> {
        self.write_durable(self.path_of(file_name), receipt.render().into_bytes())
            .await
    }

    async fn write_durable(&self, path: PathBuf, bytes: Vec<u8>) -> Result<PathBuf> {
        let result = tokio::task::spawn_blocking(move || {
            write_durable_blocking(&path, &bytes).map(|()| path)
        })
        .await
        .map_err(|e| SpoolError::Task(e.to_string()))
        .and_then(|r| r);

        match result {
            Ok(path) => {
                debug!(path = %path.display(), "Spool file written");
                Ok(path)
            }
            Err(err) => {
                Metrics::inc(&METRICS.spool_write_errors);
                Err(err)
            }
        }
    }
}

/// Temp file + fsync + rename. The temp name starts with `.` so the watcher
/// skips it.
pub fn write_durable_blocking(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = parent.join(format!(".tmp_{}", uuid::Uuid::new_v4()));

    let write_temp = || -> io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    };
    if let Err(source) = write_temp() {
        let _ = fs::remove_file(&temp_path);
        return Err(SpoolError::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    if let Err(source) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(SpoolError::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    sync_dir(parent);
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
