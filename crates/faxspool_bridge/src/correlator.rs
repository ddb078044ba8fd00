//! Artifact Correlator
//!
//! Pairs each `.sfc` descriptor with the document it names. The two files
//! may arrive in either order; whichever comes first is cached until its
//! complement shows up.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use faxspool_ids::LegacyJobId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A descriptor waiting for its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDescriptor {
    pub path: PathBuf,
    pub legacy_id: LegacyJobId,
    pub fax_number: String,
    pub document_key: String,
    pub discovered_at: DateTime<Utc>,
}

/// A document waiting for its descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDocument {
    pub path: PathBuf,
    pub document_key: String,
    pub discovered_at: DateTime<Utc>,
}

/// One unpaired half of an outbound job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingArtifact {
    Descriptor(PendingDescriptor),
    Document(PendingDocument),
}

impl PendingArtifact {
    pub fn kind(&self) -> &'static str {
        match self {
            PendingArtifact::Descriptor(_) => "descriptor",
            PendingArtifact::Document(_) => "document",
        }
    }

    pub fn local_path(&self) -> &Path {
        match self {
            PendingArtifact::Descriptor(d) => &d.path,
            PendingArtifact::Document(d) => &d.path,
        }
    }

    pub fn logical_key(&self) -> &str {
        match self {
            PendingArtifact::Descriptor(d) => &d.document_key,
            PendingArtifact::Document(d) => &d.document_key,
        }
    }

    pub fn discovered_at(&self) -> DateTime<Utc> {
        match self {
            PendingArtifact::Descriptor(d) => d.discovered_at,
            PendingArtifact::Document(d) => d.discovered_at,
        }
    }
}

/// A descriptor and its document, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedJob {
    pub legacy_id: LegacyJobId,
    pub fax_number: String,
    pub descriptor_path: PathBuf,
    pub document_path: PathBuf,
}

impl PairedJob {
    fn from_parts(descriptor: PendingDescriptor, document: PendingDocument) -> Self {
        Self {
            legacy_id: descriptor.legacy_id,
            fax_number: descriptor.fax_number,
            descriptor_path: descriptor.path,
            document_path: document.path,
        }
    }
}

/// Result of offering one artifact to the correlator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    Paired(PairedJob),
    /// No complement yet. `replaced` is true when an earlier artifact of the
    /// same kind and key was overwritten.
    Cached { replaced: bool },
}

/// The two pending maps. Only reachable through [`Correlator`], which
/// exposes take-if-present / insert operations under one lock.
#[derive(Debug, Default)]
struct ArtifactCache {
    descriptors: HashMap<String, PendingDescriptor>,
    documents: HashMap<String, PendingDocument>,
}

impl ArtifactCache {
    fn len(&self) -> usize {
        self.descriptors.len() + self.documents.len()
    }

    fn evict_older_than(&mut self, cutoff: DateTime<Utc>) -> Vec<PendingArtifact> {
        let mut evicted = Vec::new();

        let stale: Vec<String> = self
            .descriptors
            .iter()
            .filter(|(_, d)| d.discovered_at < cutoff)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            if let Some(d) = self.descriptors.remove(&key) {
                evicted.push(PendingArtifact::Descriptor(d));
            }
        }

        let stale: Vec<String> = self
            .documents
            .iter()
            .filter(|(_, d)| d.discovered_at < cutoff)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            if let Some(d) = self.documents.remove(&key) {
                evicted.push(PendingArtifact::Document(d));
            }
        }

        evicted
    }
}

#[derive(Debug, Default)]
pub struct Correlator {
    cache: Mutex<ArtifactCache>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn cache(&self) -> MutexGuard<'_, ArtifactCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn on_descriptor(
        &self,
        path: impl Into<PathBuf>,
        legacy_id: LegacyJobId,
        fax_number: impl Into<String>,
        document_key: impl Into<String>,
    ) -> Correlation {
        self.on_descriptor_at(path, legacy_id, fax_number, document_key, Utc::now())
    }

    pub fn on_descriptor_at(
        &self,
        path: impl Into<PathBuf>,
        legacy_id: LegacyJobId,
        fax_number: impl Into<String>,
        document_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Correlation {
        let descriptor = PendingDescriptor {
            path: path.into(),
            legacy_id,
            fax_number: fax_number.into(),
            document_key: document_key.into(),
            discovered_at: now,
        };

        let mut cache = self.cache();
        if let Some(document) = cache.documents.remove(&descriptor.document_key) {
            return Correlation::Paired(PairedJob::from_parts(descriptor, document));
        }
        let replaced = cache
            .descriptors
            .insert(descriptor.document_key.clone(), descriptor)
            .is_some();
        Correlation::Cached { replaced }
    }

    pub fn on_document(&self, path: impl Into<PathBuf>, document_key: impl Into<String>) -> Correlation {
        self.on_document_at(path, document_key, Utc::now())
    }

    pub fn on_document_at(
        &self,
        path: impl Into<PathBuf>,
        document_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Correlation {
        let document = PendingDocument {
            path: path.into(),
            document_key: document_key.into(),
            discovered_at: now,
        };

        let mut cache = self.cache();
        if let Some(descriptor) = cache.descriptors.remove(&document.document_key) {
            return Correlation::Paired(PairedJob::from_parts(descriptor, document));
        }
        let replaced = cache
            .documents
            .insert(document.document_key.clone(), document)
            .is_some();
        Correlation::Cached { replaced }
    }

    /// Remove and return every artifact cached for longer than `retention`.
    /// A zero retention disables eviction.
    pub fn evict_expired(&self, now: DateTime<Utc>, retention: Duration) -> Vec<PendingArtifact> {
        if retention.is_zero() {
            return Vec::new();
        }
        let Ok(retention) = ChronoDuration::from_std(retention) else {
            return Vec::new();
        };
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return Vec::new();
        };
        self.cache().evict_older_than(cutoff)
    }

    pub fn pending_count(&self) -> usize {
        self.cache().len()
    }

    pub fn pending(&self) -> Vec<PendingArtifact> {
        let cache = self.cache();
        cache
            .descriptors
            .values()
            .cloned()
            .map(PendingArtifact::Descriptor)
            .chain(cache.documents.values().cloned().map(PendingArtifact::Document))
            .collect()
    }
}
