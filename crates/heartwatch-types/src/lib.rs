//! Shared records, error codes, and timestamp handling for Heartwatch.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! the heartbeat and event records that travel through the queue, the
//! error taxonomy surfaced to clients, and the timestamp parsing rules that
//! both the aggregator and the access validator must agree on.

mod report;

pub use report::{
    extract_event_fields, extract_service_name, extract_timestamp, latency_seconds,
    parse_report_body, parse_timestamp, EventFields, ReportError, UNKNOWN_SERVICE,
};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job type consumed by the heartbeat reporter.
pub const HEARTBEAT_JOB: &str = "heartbeat_ping";

/// Job type consumed by the access-controlled event reporter.
pub const EVENT_JOB: &str = "event_ping";

/// A periodic liveness signal emitted by a producer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    /// Unique identifier of this heartbeat.
    pub id: Uuid,
    /// Moment the heartbeat was produced, with the producer's offset.
    pub timestamp: DateTime<FixedOffset>,
    /// Name of the service that produced the heartbeat.
    #[serde(alias = "servicio_origen")]
    pub origin_service: String,
}

/// A business event that is subject to the origin-country access rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier of this event.
    pub id: Uuid,
    /// Moment the event was produced, with the producer's offset.
    pub timestamp: DateTime<FixedOffset>,
    /// The subject the event claims to act for.
    #[serde(alias = "id_usuario")]
    pub subject_id: i64,
    /// ISO country code the event declares as its origin.
    #[serde(alias = "pais_consulta")]
    pub declared_country: String,
}

/// Why a watched service is being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// The service reported once but has been silent beyond the threshold.
    TimedOut,
    /// The service has never reported since the monitor started.
    NeverSeen,
}

/// A liveness alert produced by one sweep. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub service_name: String,
    pub kind: AlertKind,
    /// When the service was last seen, if ever.
    pub since: Option<DateTime<Utc>>,
    /// Seconds elapsed since `since` at sweep time.
    pub silent_for_seconds: Option<f64>,
}

/// Error taxonomy shared by every stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The body was not a JSON object (or was empty).
    MalformedInput,
    /// The `timestamp` field was absent or empty.
    MissingTimestamp,
    /// The `timestamp` field was not a timezone-aware ISO-8601 value.
    InvalidTimestampFormat,
    /// The subject's access is revoked or its origin did not match.
    AccessDenied,
    /// A worker could not reach its reporter endpoint.
    DownstreamUnreachable,
    /// A producer could not submit to the queue.
    QueueUnavailable,
    /// A backing store failed while serving a request.
    StoreUnavailable,
}

impl ErrorCode {
    /// Returns the canonical label for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedInput => "MALFORMED_INPUT",
            Self::MissingTimestamp => "MISSING_TIMESTAMP",
            Self::InvalidTimestampFormat => "INVALID_TIMESTAMP_FORMAT",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::DownstreamUnreachable => "DOWNSTREAM_UNREACHABLE",
            Self::QueueUnavailable => "QUEUE_UNAVAILABLE",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_serializes_as_label() {
        for code in [
            ErrorCode::MalformedInput,
            ErrorCode::MissingTimestamp,
            ErrorCode::InvalidTimestampFormat,
            ErrorCode::AccessDenied,
            ErrorCode::DownstreamUnreachable,
            ErrorCode::QueueUnavailable,
            ErrorCode::StoreUnavailable,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, serde_json::Value::String(code.as_str().to_string()));
        }
    }

    #[test]
    fn heartbeat_record_accepts_legacy_field_name() {
        let json = serde_json::json!({
            "id": "6f1c2a7e-0d7b-4a55-9b1e-2f0c7f3e9a10",
            "timestamp": "2025-03-01T08:30:00.250000-05:00",
            "servicio_origen": "modulo-pedidos-1"
        });
        let record: HeartbeatRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.origin_service, "modulo-pedidos-1");
        assert_eq!(record.timestamp.offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn never_seen_alert_has_no_since() {
        let alert = AlertEvent {
            service_name: "orders-2".to_string(),
            kind: AlertKind::NeverSeen,
            since: None,
            silent_for_seconds: None,
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["kind"], "NEVER_SEEN");
        assert!(json["since"].is_null());
    }

    #[test]
    fn event_record_serializes_canonical_names() {
        let record = EventRecord {
            id: Uuid::nil(),
            timestamp: DateTime::parse_from_rfc3339("2025-03-01T08:30:00-05:00").unwrap(),
            subject_id: 42,
            declared_country: "CO".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["subject_id"], 42);
        assert_eq!(json["declared_country"], "CO");
        assert_eq!(json["timestamp"], "2025-03-01T08:30:00-05:00");
    }
}
