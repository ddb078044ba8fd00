//! HTTP callback surface
//!
//! Routes:
//! - `POST /fax/notify`: delivery-status notifications
//! - `POST /fax/inbound`: inbound fax documents
//! - `GET /healthz`, `GET /metrics`
//!
//! Bodies are taken as raw bytes and parsed here so malformed JSON maps to
//! a 400 with the bridge's own error body.

use crate::engine::SpoolEngine;
use crate::inbound::InboundError;
use crate::metrics::METRICS;
use crate::transport::FaxTransport;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use faxspool_protocol::defaults::{HEALTH_PATH, INBOUND_PATH, METRICS_PATH, NOTIFY_PATH};
use faxspool_protocol::{
    ErrorResponse, HealthResponse, InboundFax, InboundResponse, NotificationPayload,
    NotifyResponse,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HttpError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        // Internal details (paths, io errors) stay in the log.
        let message = match &self {
            Self::InvalidPayload(detail) => format!("invalid payload: {}", detail),
            Self::Internal(_) => "internal server error".to_string(),
        };
        (self.status_code(), Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<InboundError> for HttpError {
    fn from(err: InboundError) -> Self {
        if err.is_client_error() {
            HttpError::InvalidPayload(err.to_string())
        } else {
            HttpError::Internal(err.to_string())
        }
    }
}

pub fn router<T: FaxTransport>(engine: Arc<SpoolEngine<T>>) -> Router {
    Router::new()
        .route(NOTIFY_PATH, post(notify::<T>))
        .route(INBOUND_PATH, post(inbound::<T>))
        .route(HEALTH_PATH, get(health::<T>))
        .route(METRICS_PATH, get(metrics))
        .with_state(engine)
}

async fn notify<T: FaxTransport>(
    State(engine): State<Arc<SpoolEngine<T>>>,
    body: Bytes,
) -> Result<Json<NotifyResponse>, HttpError> {
    let payload: NotificationPayload = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejected notification body: {}", e);
        HttpError::InvalidPayload(e.to_string())
    })?;
    let report = engine.matcher().on_notification(&payload).await;
    Ok(Json(report))
}

async fn inbound<T: FaxTransport>(
    State(engine): State<Arc<SpoolEngine<T>>>,
    body: Bytes,
) -> Result<Json<InboundResponse>, HttpError> {
    let fax: InboundFax = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejected inbound fax body: {}", e);
        HttpError::InvalidPayload(e.to_string())
    })?;
    let received = engine.inbound().receive_callback(&fax).await.map_err(|e| {
        if !e.is_client_error() {
            error!(source = %fax.uuid, "Inbound fax could not be stored: {}", e);
        }
        HttpError::from(e)
    })?;

    Ok(Json(InboundResponse {
        document: file_name(&received.document_path),
        receipt: file_name(&received.receipt_path),
    }))
}

async fn health<T: FaxTransport>(State(engine): State<Arc<SpoolEngine<T>>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        pending_artifacts: engine.correlator().pending_count(),
        in_flight_jobs: engine.registry().len(),
    })
}

async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.prometheus_format(),
    )
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
