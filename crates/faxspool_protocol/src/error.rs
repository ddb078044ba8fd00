//! Error types for spool formats and webhook payloads

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("Malformed status file: {0}")]
    MalformedStatus(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] faxspool_ids::IdParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ProtocolError>;
