//! Canonical default values shared by the bridge and its tooling.

/// Queue sub-directory below the spool root.
pub const DEFAULT_QUEUE_DIR: &str = "synergyfaxq";
pub const DEFAULT_HTTP_BIND_ADDR: &str = "0.0.0.0:8080";

pub const DESCRIPTOR_EXTENSION: &str = "sfc";
pub const DEFAULT_DOCUMENT_EXTENSIONS: &[&str] = &["pdf"];
pub const JOBID_EXTENSION: &str = "jobid";
pub const STATUS_EXTENSION: &str = "sts";
pub const DONE_EXTENSION: &str = "done";
pub const FAIL_EXTENSION: &str = "fail";
pub const RECEIPT_EXTENSION: &str = "recv";
pub const INBOUND_DOCUMENT_EXTENSION: &str = "pdf";

/// Prefix of documents materialized from inbound faxes. The watcher never
/// treats these as outbound documents.
pub const INBOUND_PREFIX: &str = "recv_";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RETENTION_SECS: u64 = 3_600;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

pub const NOTIFY_PATH: &str = "/fax/notify";
pub const INBOUND_PATH: &str = "/fax/inbound";
pub const HEALTH_PATH: &str = "/healthz";
pub const METRICS_PATH: &str = "/metrics";

/// Status text written with `state:6`.
pub const SENT_TO_TRANSPORT_MESSAGE: &str = "Sent to WebHook";
/// Status text written with `state:7` on success.
pub const COMPLETED_MESSAGE: &str = "Completed";
