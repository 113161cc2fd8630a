//! Reporting and status handlers.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use heartwatch_access::{AccessDecision, AccessError, DenyReason};
use heartwatch_liveness::{ServiceLivenessState, SweepReport};
use heartwatch_types::{
    extract_event_fields, extract_service_name, extract_timestamp, latency_seconds,
    parse_report_body, ErrorCode, ReportError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Target of the per-report log lines, written to their own file when file
/// logging is enabled.
pub const REPORT_TARGET: &str = "heartwatch::reports";

/// Body returned by every successful report.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReportAck {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_seconds: Option<f64>,
}

impl ReportAck {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "OK".to_string(),
            message: message.into(),
            service: None,
            latency_seconds: None,
        }
    }

    fn with_latency(mut self, service: impl Into<String>, latency_seconds: f64) -> Self {
        self.service = Some(service.into());
        self.latency_seconds = Some(latency_seconds);
        self
    }
}

/// Response body for `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub services: BTreeMap<String, ServiceLivenessState>,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Report(e) => ApiError::Report(e),
            other => ApiError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::InternalServerError(format!("task failed: {err}"))
    }
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Report(e) => e.code().as_str(),
            ApiError::AccessDenied(_) => ErrorCode::AccessDenied.as_str(),
            ApiError::BadRequest(_) => ErrorCode::MalformedInput.as_str(),
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::StoreUnavailable(_) => ErrorCode::StoreUnavailable.as_str(),
            ApiError::InternalServerError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Report(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::AccessDenied(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::StoreUnavailable(_) | ApiError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }

        let body = Json(serde_json::json!({
            "status": "error",
            "code": self.code(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Handler for `POST /report/heartbeat`.
///
/// The body is read raw so that a missing or wrong content type is reported
/// as `MALFORMED_INPUT` like any other unparsable body.
pub async fn report_heartbeat_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ReportAck>, ApiError> {
    let received_at = Utc::now();

    let body = parse_report_body(&body).inspect_err(|e| {
        tracing::warn!(error = %e, "rejected heartbeat");
    })?;
    let sent_at = extract_timestamp(&body).inspect_err(|e| {
        tracing::warn!(error = %e, "rejected heartbeat");
    })?;
    let service = extract_service_name(&body);

    let latency = latency_seconds(received_at, sent_at);
    state.liveness.record_report(&service, received_at, latency);

    tracing::info!(
        target: REPORT_TARGET,
        service = %service,
        latency_seconds = latency,
        "heartbeat received"
    );

    Ok(Json(
        ReportAck::ok("heartbeat recorded").with_latency(service, latency),
    ))
}

/// Handler for `POST /report/event`.
///
/// Applies the origin-country rule before anything is recorded.
pub async fn report_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ReportAck>, ApiError> {
    let received_at = Utc::now();

    let body = parse_report_body(&body).inspect_err(|e| {
        tracing::warn!(error = %e, "rejected event");
    })?;
    let fields = extract_event_fields(&body).inspect_err(|e| {
        tracing::warn!(error = %e, "rejected event");
    })?;
    let timestamp = extract_timestamp(&body);

    let validator = state.validator.clone();
    let subject_id = fields.subject_id;
    let declared_country = fields.declared_country.clone();
    let decision = tokio::task::spawn_blocking(move || {
        validator.validate(subject_id, &declared_country, timestamp, received_at)
    })
    .await??;

    match decision {
        AccessDecision::AllowKnown { latency_seconds } => {
            state
                .liveness
                .record_report(&state.event_source, received_at, latency_seconds);
            tracing::info!(
                target: REPORT_TARGET,
                subject_id,
                declared_country = %fields.declared_country,
                latency_seconds,
                "event accepted"
            );
            Ok(Json(
                ReportAck::ok("event accepted")
                    .with_latency(state.event_source.clone(), latency_seconds),
            ))
        }
        AccessDecision::AllowUnknownSubject => {
            tracing::info!(
                target: REPORT_TARGET,
                subject_id,
                "event accepted for unregistered subject"
            );
            Ok(Json(ReportAck::ok(
                "subject not registered, event accepted without access checks",
            )))
        }
        AccessDecision::Deny(DenyReason::Revoked) => Err(ApiError::AccessDenied(format!(
            "access for subject {subject_id} is revoked"
        ))),
        AccessDecision::Deny(DenyReason::CountryMismatch {
            origin_country,
            declared_country,
        }) => Err(ApiError::AccessDenied(format!(
            "subject {subject_id} declared {declared_country} but is registered in {origin_country}; access revoked"
        ))),
    }
}

/// Handler for `GET /status`.
pub async fn status_handler(Extension(state): Extension<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "OK".to_string(),
        services: state.liveness.snapshot(),
    })
}

/// Handler for `GET /status/sweep`.
///
/// Classifies the watch list now without emitting alerts.
pub async fn sweep_status_handler(Extension(state): Extension<Arc<AppState>>) -> Json<SweepReport> {
    Json(state.sweeper.evaluate(Utc::now()))
}
