//! Spool file naming.
//!
//! Every sentinel is named after a job or source identifier so concurrent
//! writers never collide across jobs.

use crate::defaults::{
    DONE_EXTENSION, FAIL_EXTENSION, INBOUND_DOCUMENT_EXTENSION, INBOUND_PREFIX, JOBID_EXTENSION,
    RECEIPT_EXTENSION, STATUS_EXTENSION,
};
use chrono::{DateTime, Utc};
use faxspool_ids::{LegacyJobId, SourceId};

pub fn jobid_file_name(job: &LegacyJobId) -> String {
    format!("{}.{}", job, JOBID_EXTENSION)
}

/// `.sts` file name. HylaFax queues prefix status files with `Q`; the prefix
/// is configurable and empty by default.
pub fn status_file_name(prefix: &str, job: &LegacyJobId) -> String {
    format!("{}{}.{}", prefix, job, STATUS_EXTENSION)
}

pub fn done_file_name(job: &LegacyJobId) -> String {
    format!("{}.{}", job, DONE_EXTENSION)
}

pub fn fail_file_name(job: &LegacyJobId) -> String {
    format!("{}.{}", job, FAIL_EXTENSION)
}

/// Returns true if the component is already filesystem-safe.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Slug an identifier into `[A-Za-z0-9_-]`, collapsing runs of other
/// characters into a single underscore.
pub fn safe_component(name: &str) -> String {
    if is_safe_component(name) {
        return name.to_string();
    }

    let mut slug = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            last_was_underscore = false;
            slug.push(ch);
        } else if !last_was_underscore {
            last_was_underscore = true;
            slug.push('_');
        }
    }

    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "source".to_string()
    } else {
        slug.to_string()
    }
}

/// Stem shared by an inbound document and its receipt:
/// `recv_<source>_<yyyymmddHHMMSS>_<token>`.
pub fn inbound_stem(source: &SourceId, received_at: DateTime<Utc>, token: &str) -> String {
    format!(
        "{}{}_{}_{}",
        INBOUND_PREFIX,
        safe_component(source.as_str()),
        received_at.format("%Y%m%d%H%M%S"),
        token
    )
}

pub fn inbound_document_name(stem: &str) -> String {
    format!("{}.{}", stem, INBOUND_DOCUMENT_EXTENSION)
}

pub fn receipt_file_name(stem: &str) -> String {
    format!("{}.{}", stem, RECEIPT_EXTENSION)
}
