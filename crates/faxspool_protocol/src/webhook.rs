//! Webhook payload types.
//!
//! Request/response bodies exchanged with the remote fax transport: the
//! outbound submission response, delivery-status notifications and inbound
//! fax deliveries, plus the JSON bodies returned by the bridge's own HTTP
//! surface.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Outbound submission
// ============================================================================

/// Multipart field carrying the callee number.
pub const FIELD_CALLEE_NUMBER: &str = "callee_number";
/// Multipart field carrying the local (caller) number.
pub const FIELD_CALLER_NUMBER: &str = "caller_number";
/// Multipart file part carrying the document.
pub const FIELD_FILE: &str = "file";

/// Response body of a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitResponse {
    pub job_uuid: String,
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// Delivery-status notifications
// ============================================================================

/// Which field of a [`DeliveryResult`] identifies the submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationField {
    /// The transport's job identifier (`job_uuid` at submission time).
    #[default]
    Uuid,
    /// The call-session identifier.
    CallUuid,
}

impl CorrelationField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::CallUuid => "call_uuid",
        }
    }
}

impl std::str::FromStr for CorrelationField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uuid" | "job_uuid" => Ok(Self::Uuid),
            "call_uuid" => Ok(Self::CallUuid),
            other => Err(format!(
                "unknown correlation field '{}' (expected uuid or call_uuid)",
                other
            )),
        }
    }
}

/// Delivery-status callback body.
///
/// Entries stay raw JSON until [`NotificationPayload::entries`] decodes them
/// one at a time, so a badly typed entry cannot reject its siblings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Per-job results keyed by the transport's correlation key.
    #[serde(default)]
    pub results: BTreeMap<String, serde_json::Value>,
    /// Aggregate result of the whole transport job (informational).
    #[serde(default, alias = "job_result", skip_serializing_if = "Option::is_none")]
    pub job: Option<serde_json::Value>,
}

impl NotificationPayload {
    /// Decode each result entry independently, in key order.
    pub fn entries(
        &self,
    ) -> impl Iterator<Item = (&str, Result<DeliveryResult, serde_json::Error>)> + '_ {
        self.results
            .iter()
            .map(|(key, raw)| (key.as_str(), DeliveryResult::deserialize(raw)))
    }
}

/// Result for one submitted job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryResult {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub call_uuid: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Option<ResultDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultDetail {
    #[serde(default)]
    pub success: bool,
    /// Numeric or textual code, depending on the transport version.
    #[serde(default)]
    pub result_code: Option<serde_json::Value>,
    #[serde(default)]
    pub result_text: Option<String>,
    #[serde(default)]
    pub pages: Option<u32>,
}

/// Interpretation of a [`DeliveryResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Succeeded,
    Failed { reason: String },
    InProgress { status: String },
    /// Neither a result nor a recognised status.
    Unknown,
}

const SUCCESS_STATUSES: &[&str] = &["success", "succeeded", "completed", "delivered", "sent"];
const FAILURE_STATUSES: &[&str] = &[
    "failed",
    "failure",
    "error",
    "busy",
    "no_answer",
    "cancelled",
    "canceled",
    "rejected",
];
const PROGRESS_STATUSES: &[&str] = &[
    "queued",
    "dialing",
    "ringing",
    "answered",
    "sending",
    "in_progress",
    "processing",
];

impl DeliveryResult {
    /// The identifier selected by `field`, if present and non-empty.
    pub fn correlation_id(&self, field: CorrelationField) -> Option<&str> {
        let value = match field {
            CorrelationField::Uuid => self.uuid.as_deref(),
            CorrelationField::CallUuid => self.call_uuid.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn outcome(&self) -> DeliveryOutcome {
        if let Some(result) = &self.result {
            if result.success {
                return DeliveryOutcome::Succeeded;
            }
            return DeliveryOutcome::Failed {
                reason: result.describe().unwrap_or_else(|| {
                    self.status
                        .clone()
                        .unwrap_or_else(|| "delivery failed".to_string())
                }),
            };
        }

        let Some(status) = self.status.as_deref() else {
            return DeliveryOutcome::Unknown;
        };
        let normalized = status.trim().to_ascii_lowercase();
        if SUCCESS_STATUSES.contains(&normalized.as_str()) {
            DeliveryOutcome::Succeeded
        } else if FAILURE_STATUSES.contains(&normalized.as_str()) {
            DeliveryOutcome::Failed {
                reason: status.to_string(),
            }
        } else if PROGRESS_STATUSES.contains(&normalized.as_str()) {
            DeliveryOutcome::InProgress {
                status: status.to_string(),
            }
        } else {
            DeliveryOutcome::Unknown
        }
    }

    pub fn pages(&self) -> u32 {
        self.result.as_ref().and_then(|r| r.pages).unwrap_or(0)
    }
}

impl ResultDetail {
    /// Human-readable failure description from `result_text`/`result_code`.
    pub fn describe(&self) -> Option<String> {
        let code = self.result_code.as_ref().and_then(|code| match code {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        });
        match (code, self.result_text.as_deref()) {
            (Some(code), Some(text)) => Some(format!("{} ({})", text, code)),
            (None, Some(text)) => Some(text.to_string()),
            (Some(code), None) => Some(format!("result code {}", code)),
            (None, None) => None,
        }
    }
}

// ============================================================================
// Inbound fax delivery
// ============================================================================

/// Inbound fax callback body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundFax {
    pub uuid: String,
    #[serde(default)]
    pub call_uuid: Option<String>,
    /// Local number the fax was sent to.
    #[serde(default)]
    pub number: Option<String>,
    /// Caller ID number.
    #[serde(default)]
    pub cidnum: Option<String>,
    #[serde(default)]
    pub cidname: Option<String>,
    /// Original filename at the transport (informational).
    #[serde(default)]
    pub filename: Option<String>,
    /// Base64-encoded document.
    pub file_data: String,
}

// ============================================================================
// Bridge HTTP responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

/// Summary returned for a processed notification payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifyResponse {
    pub matched: usize,
    pub unmatched: usize,
    pub in_progress: usize,
    pub ignored: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundResponse {
    pub document: String,
    pub receipt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub pending_artifacts: usize,
    pub in_flight_jobs: usize,
}
