//! Inbound Materializer
//!
//! Turns an inbound fax callback into a document plus a `.recv` receipt in
//! the spool directory. The document is written first; the receipt is what
//! legacy tooling polls for.

use crate::metrics::{Metrics, METRICS};
use crate::spool::{SpoolDir, SpoolError};
use chrono::{DateTime, Utc};
use faxspool_ids::{IdParseError, SessionSequence, SourceId};
use faxspool_protocol::{naming, InboundFax, ProtocolError, ReceiptSentinel};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const UNKNOWN_CALLER: &str = "unknown";

#[derive(Error, Debug)]
pub enum InboundError {
    #[error("Invalid source id: {0}")]
    InvalidSource(#[from] IdParseError),

    #[error("Document could not be decoded: {0}")]
    Decode(#[from] ProtocolError),

    #[error("Document is empty")]
    EmptyDocument,

    #[error(transparent)]
    Write(#[from] SpoolError),
}

impl InboundError {
    /// True when the caller sent bad input (as opposed to a local failure).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, InboundError::Write(_))
    }
}

/// A fax materialized into the spool. Not retained after the call returns.
#[derive(Debug, Clone)]
pub struct ReceivedFax {
    pub source_id: SourceId,
    pub document_path: PathBuf,
    pub receipt_path: PathBuf,
    pub caller_number: String,
    pub received_at: DateTime<Utc>,
}

pub struct InboundMaterializer {
    spool: SpoolDir,
    sequence: Arc<SessionSequence>,
}

impl InboundMaterializer {
    pub fn new(spool: SpoolDir, sequence: Arc<SessionSequence>) -> Self {
        Self { spool, sequence }
    }

    /// Decode and persist one inbound document.
    ///
    /// `session` is the call-session identifier when the transport supplies
    /// one; otherwise a sequence-derived token is used.
    pub async fn receive(
        &self,
        source_id: &SourceId,
        caller_number: &str,
        encoded_document: &str,
        session: Option<&str>,
    ) -> Result<ReceivedFax, InboundError> {
        let result = self
            .materialize(source_id, caller_number, encoded_document, session)
            .await;
        match &result {
            Ok(fax) => {
                Metrics::inc(&METRICS.inbound_received);
                info!(
                    source = %fax.source_id,
                    caller = %fax.caller_number,
                    document = %fax.document_path.display(),
                    "Inbound fax received"
                );
            }
            Err(err) => {
                Metrics::inc(&METRICS.inbound_failures);
                warn!(source = %source_id, "Inbound fax rejected: {}", err);
            }
        }
        result
    }

    /// Entry point for the `/fax/inbound` callback body.
    pub async fn receive_callback(&self, fax: &InboundFax) -> Result<ReceivedFax, InboundError> {
        let source_id = match SourceId::parse(fax.uuid.trim()) {
            Ok(id) => id,
            Err(err) => {
                Metrics::inc(&METRICS.inbound_failures);
                return Err(err.into());
            }
        };
        let caller = fax
            .cidnum
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_CALLER);
        let session = fax
            .call_uuid
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        self.receive(&source_id, caller, &fax.file_data, session).await
    }

    async fn materialize(
        &self,
        source_id: &SourceId,
        caller_number: &str,
        encoded_document: &str,
        session: Option<&str>,
    ) -> Result<ReceivedFax, InboundError> {
        let document = faxspool_protocol::decode_document(encoded_document)?;
        if document.is_empty() {
            return Err(InboundError::EmptyDocument);
        }

        let received_at = Utc::now();
        let token = self.sequence.next_token();
        let session_token = match session {
            Some(session) => session.to_string(),
            None => format!("S{}", token),
        };

        let stem = naming::inbound_stem(source_id, received_at, &token);
        let document_name = naming::inbound_document_name(&stem);
        let document_path = self.spool.write_document(&document_name, document).await?;

        let caller_number = if caller_number.trim().is_empty() {
            UNKNOWN_CALLER.to_string()
        } else {
            caller_number.to_string()
        };
        let receipt = ReceiptSentinel {
            received_at,
            session_token,
            document_name,
            caller_number: caller_number.clone(),
        };
        let receipt_path = self
            .spool
            .write_receipt(&naming::receipt_file_name(&stem), &receipt)
            .await?;

        Ok(ReceivedFax {
            source_id: source_id.clone(),
            document_path,
            receipt_path,
            caller_number,
            received_at,
        })
    }
}
