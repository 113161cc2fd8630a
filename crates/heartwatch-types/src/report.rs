//! Parsing of reporter payloads.
//!
//! The reporting endpoints validate in a fixed order: structured body,
//! then presence of `timestamp`, then its format. The helpers here keep
//! that order identical for heartbeats and events.

use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{Map, Value};

use crate::ErrorCode;

/// Service name recorded when a heartbeat does not identify its origin.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Rejection reasons for a reporter payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    /// The body is not a non-empty JSON object.
    #[error("request body must be a non-empty JSON object")]
    MalformedInput,

    /// A required event field is absent or has the wrong type.
    #[error("missing or invalid field: {0}")]
    MissingField(&'static str),

    /// The `timestamp` field is absent or empty.
    #[error("missing timestamp")]
    MissingTimestamp,

    /// The `timestamp` field is not timezone-aware ISO-8601.
    #[error("invalid timestamp format: {0}")]
    InvalidTimestampFormat(String),
}

impl ReportError {
    /// Maps the rejection onto the shared error taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedInput | Self::MissingField(_) => ErrorCode::MalformedInput,
            Self::MissingTimestamp => ErrorCode::MissingTimestamp,
            Self::InvalidTimestampFormat(_) => ErrorCode::InvalidTimestampFormat,
        }
    }
}

/// Parses a raw request body into a JSON object.
///
/// Empty objects are rejected the same way as non-JSON input.
pub fn parse_report_body(body: &[u8]) -> Result<Map<String, Value>, ReportError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) if !map.is_empty() => Ok(map),
        _ => Err(ReportError::MalformedInput),
    }
}

/// Offset-carrying layouts tried after RFC 3339. `%#z` takes `-05`,
/// `-0500` and `-05:00`.
const ISO_8601_LAYOUTS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%#z"];

/// Parses a timezone-aware ISO-8601 timestamp.
///
/// Accepts RFC 3339 (`T` or space separator, optional fraction, `Z` or a
/// numeric offset) as well as offsets written without a colon or without
/// minutes. Timestamps without an offset are rejected.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, ReportError> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts);
    }
    ISO_8601_LAYOUTS
        .iter()
        .find_map(|layout| DateTime::parse_from_str(trimmed, layout).ok())
        .ok_or_else(|| ReportError::InvalidTimestampFormat(raw.to_string()))
}

/// Reads and parses the `timestamp` field of a report body.
pub fn extract_timestamp(body: &Map<String, Value>) -> Result<DateTime<FixedOffset>, ReportError> {
    match body.get("timestamp") {
        None | Some(Value::Null) => Err(ReportError::MissingTimestamp),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ReportError::MissingTimestamp),
        Some(Value::String(s)) => parse_timestamp(s),
        Some(other) => Err(ReportError::InvalidTimestampFormat(other.to_string())),
    }
}

/// Reads the reporting service name, falling back to [`UNKNOWN_SERVICE`].
pub fn extract_service_name(body: &Map<String, Value>) -> String {
    ["origin_service", "servicio_origen"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_SERVICE)
        .to_string()
}

/// Subject and declared origin carried by an event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFields {
    pub subject_id: i64,
    pub declared_country: String,
}

/// Reads the access-control fields of an event body.
///
/// `subject_id` may be a JSON integer or a numeric string.
pub fn extract_event_fields(body: &Map<String, Value>) -> Result<EventFields, ReportError> {
    let subject = body.get("subject_id").or_else(|| body.get("id_usuario"));
    let subject_id = match subject {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or(ReportError::MissingField("subject_id"))?;

    let declared_country = body
        .get("declared_country")
        .or_else(|| body.get("pais_consulta"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(ReportError::MissingField("declared_country"))?
        .to_string();

    Ok(EventFields {
        subject_id,
        declared_country,
    })
}

/// Seconds elapsed between `sent_at` and `received_at`.
///
/// Negative under clock skew; the value is never clamped.
pub fn latency_seconds(received_at: DateTime<Utc>, sent_at: DateTime<FixedOffset>) -> f64 {
    let delta = received_at.signed_duration_since(sent_at);
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn body_must_be_non_empty_object() {
        assert_eq!(parse_report_body(b"not json"), Err(ReportError::MalformedInput));
        assert_eq!(parse_report_body(b"[1,2]"), Err(ReportError::MalformedInput));
        assert_eq!(parse_report_body(b"{}"), Err(ReportError::MalformedInput));
        assert_eq!(parse_report_body(b""), Err(ReportError::MalformedInput));
        assert!(parse_report_body(br#"{"timestamp":"x"}"#).is_ok());
    }

    #[test]
    fn timestamp_absent_null_or_blank_is_missing() {
        for body in [
            json!({"origin_service": "a"}),
            json!({"timestamp": null}),
            json!({"timestamp": "   "}),
        ] {
            assert_eq!(
                extract_timestamp(&object(body)),
                Err(ReportError::MissingTimestamp)
            );
        }
    }

    #[test]
    fn naive_and_garbage_timestamps_are_invalid() {
        for raw in ["2025-03-01T08:30:00", "yesterday", "2025-13-01T00:00:00Z"] {
            let err = parse_timestamp(raw).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidTimestampFormat, "{raw}");
        }
        let err = extract_timestamp(&object(json!({"timestamp": 1700000000}))).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTimestampFormat);
    }

    #[test]
    fn accepts_offsets_fractions_and_space_separator() {
        let a = parse_timestamp("2025-03-01T08:30:00.123456-05:00").unwrap();
        let b = parse_timestamp("2025-03-01 13:30:00.123456+00:00").unwrap();
        let c = parse_timestamp("2025-03-01T13:30:00.123456Z").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn accepts_compact_and_hour_only_offsets() {
        let expected = parse_timestamp("2025-03-01T08:30:00-05:00").unwrap();
        for raw in [
            "2025-03-01T08:30:00-0500",
            "2025-03-01T08:30:00-05",
            "2025-03-01 08:30:00.000-0500",
        ] {
            assert_eq!(parse_timestamp(raw).unwrap(), expected, "{raw}");
        }
        assert_eq!(
            parse_timestamp("2025-03-01T08:30:00-05")
                .unwrap()
                .offset()
                .local_minus_utc(),
            -5 * 3600
        );
    }

    #[test]
    fn latency_is_signed_and_unclamped() {
        let received = Utc.with_ymd_and_hms(2025, 3, 1, 13, 30, 2).unwrap();
        let sent = parse_timestamp("2025-03-01T08:30:00.5-05:00").unwrap();
        assert!((latency_seconds(received, sent) - 1.5).abs() < 1e-9);

        let future = parse_timestamp("2025-03-01T13:30:05Z").unwrap();
        assert!((latency_seconds(received, future) + 3.0).abs() < 1e-9);
    }

    #[test]
    fn service_name_falls_back_to_unknown() {
        assert_eq!(extract_service_name(&object(json!({"timestamp": "x"}))), UNKNOWN_SERVICE);
        assert_eq!(
            extract_service_name(&object(json!({"servicio_origen": "modulo-pedidos-2"}))),
            "modulo-pedidos-2"
        );
        assert_eq!(
            extract_service_name(&object(json!({"origin_service": " billing "}))),
            "billing"
        );
    }

    #[test]
    fn event_fields_accept_legacy_names_and_numeric_strings() {
        let fields = extract_event_fields(&object(json!({
            "id_usuario": "17",
            "pais_consulta": "PE"
        })))
        .unwrap();
        assert_eq!(fields.subject_id, 17);
        assert_eq!(fields.declared_country, "PE");

        let err = extract_event_fields(&object(json!({"declared_country": "CO"}))).unwrap_err();
        assert_eq!(err, ReportError::MissingField("subject_id"));
        assert_eq!(err.code(), ErrorCode::MalformedInput);

        let err = extract_event_fields(&object(json!({"subject_id": 3}))).unwrap_err();
        assert_eq!(err, ReportError::MissingField("declared_country"));
    }
}
