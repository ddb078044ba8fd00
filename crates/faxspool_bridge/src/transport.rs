//! Outbound fax transport
//!
//! The submitter talks to the transport through [`FaxTransport`] so tests
//! can substitute a recording double. [`WebhookTransport`] is the real
//! implementation: a multipart POST with Basic authentication.

use faxspool_protocol::webhook::{FIELD_CALLEE_NUMBER, FIELD_CALLER_NUMBER, FIELD_FILE};
use faxspool_protocol::SubmitResponse;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport request failed: {0}")]
    Request(String),

    #[error("Transport request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport rejected submission with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed transport response: {0}")]
    MalformedResponse(String),
}

/// A fax ready to be handed to the transport.
#[derive(Debug, Clone)]
pub struct OutboundFax {
    pub callee_number: String,
    pub caller_number: String,
    pub document_name: String,
    pub document: Vec<u8>,
}

pub trait FaxTransport: Send + Sync + 'static {
    /// Submit one fax. Exactly one request per call; no retries.
    fn submit(
        &self,
        fax: OutboundFax,
    ) -> impl Future<Output = Result<SubmitResponse, TransportError>> + Send;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

pub struct WebhookTransport {
    http_client: reqwest::Client,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
}

impl WebhookTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            http_client,
            endpoint: config.endpoint,
            username: config.username,
            password: config.password,
            timeout: config.timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Request(err.to_string())
        }
    }

    async fn send(&self, fax: OutboundFax) -> Result<SubmitResponse, TransportError> {
        let file_part = reqwest::multipart::Part::bytes(fax.document)
            .file_name(fax.document_name)
            .mime_str("application/pdf")
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text(FIELD_CALLEE_NUMBER, fax.callee_number)
            .text(FIELD_CALLER_NUMBER, fax.caller_number)
            .part(FIELD_FILE, file_part);

        let mut request = self.http_client.post(&self.endpoint).multipart(form);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }

        parse_submit_response(&body)
    }
}

impl FaxTransport for WebhookTransport {
    fn submit(
        &self,
        fax: OutboundFax,
    ) -> impl Future<Output = Result<SubmitResponse, TransportError>> + Send {
        self.send(fax)
    }
}

/// Parse a success body. `job_uuid` must be present and non-blank.
pub fn parse_submit_response(body: &str) -> Result<SubmitResponse, TransportError> {
    let response: SubmitResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::MalformedResponse(e.to_string()))?;
    if response.job_uuid.trim().is_empty() {
        return Err(TransportError::MalformedResponse(
            "empty job_uuid".to_string(),
        ));
    }
    Ok(response)
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_body() {
        let response = parse_submit_response(r#"{"job_uuid":"abc-123","message":"queued"}"#).unwrap();
        assert_eq!(response.job_uuid, "abc-123");
        assert_eq!(response.message, "queued");
    }

    #[test]
    fn message_is_optional() {
        let response = parse_submit_response(r#"{"job_uuid":"abc-123"}"#).unwrap();
        assert!(response.message.is_empty());
    }

    #[test]
    fn rejects_missing_or_blank_job_uuid() {
        assert!(matches!(
            parse_submit_response(r#"{"message":"ok"}"#),
            Err(TransportError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_submit_response(r#"{"job_uuid":"  "}"#),
            Err(TransportError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_submit_response("<html>"),
            Err(TransportError::MalformedResponse(_))
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é...");
    }

    fn transport_for(endpoint: String, timeout: Duration) -> WebhookTransport {
        WebhookTransport::new(TransportConfig {
            endpoint,
            username: Some("user".into()),
            password: Some("pass".into()),
            timeout,
        })
        .unwrap()
    }

    fn sample_fax() -> OutboundFax {
        OutboundFax {
            callee_number: "+15551234567".into(),
            caller_number: "+15550000000".into(),
            document_name: "invoice.pdf".into(),
            document: b"%PDF".to_vec(),
        }
    }

    #[tokio::test]
    async fn silent_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold connections without ever answering.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let timeout = Duration::from_millis(200);
        let transport = transport_for(format!("http://{}/send", addr), timeout);
        let err = transport.submit(sample_fax()).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(t) if t == timeout), "{:?}", err);
        server.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_a_request_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = transport_for(format!("http://{}/send", addr), Duration::from_secs(5));
        let err = transport.submit(sample_fax()).await.unwrap_err();
        assert!(matches!(err, TransportError::Request(_)), "{:?}", err);
    }
}
