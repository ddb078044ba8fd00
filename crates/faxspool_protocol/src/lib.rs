//! FaxSpool protocol
//!
//! Formats shared between the bridge and legacy fax-queue tooling:
//!
//! - Spool files: `.sfc` descriptors, `.jobid`/`.sts`/`.done`/`.fail`
//!   sentinels and `.recv` receipts
//! - Webhook payloads: submission responses, delivery notifications and
//!   inbound fax deliveries
//! - Naming rules for every file the bridge writes

pub mod defaults;
pub mod error;
pub mod naming;
pub mod spool;
pub mod webhook;

pub use error::{ProtocolError, Result};
pub use spool::{
    classify_file, Descriptor, FileRole, ReceiptSentinel, StatusCode, StatusSentinel,
    RECEIPT_TIMESTAMP_FORMAT,
};
pub use webhook::{
    CorrelationField, DeliveryOutcome, DeliveryResult, ErrorResponse, HealthResponse,
    InboundFax, InboundResponse, NotificationPayload, NotifyResponse, ResultDetail,
    SubmitResponse,
};

pub use faxspool_ids::{LegacyJobId, RemoteJobId, SourceId};

use base64::Engine;

/// Decode a transport-encoded document. ASCII whitespace (line wrapping) is
/// ignored.
pub fn decode_document(encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact.as_bytes())?)
}
