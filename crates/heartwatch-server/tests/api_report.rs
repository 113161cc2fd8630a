mod common;

use axum::http::StatusCode;
use chrono::{Duration, FixedOffset, SecondsFormat, Utc};
use common::{get, post_json, post_raw, send, test_state};
use serde_json::json;

fn bogota_timestamp(at: chrono::DateTime<Utc>) -> String {
    let offset = FixedOffset::west_opt(5 * 3600).unwrap();
    at.with_timezone(&offset)
        .to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[tokio::test]
async fn health_reports_queue_depth() {
    let state = test_state(&[]);
    let (status, body) = send(&state, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queue"]["pending"], 0);
}

#[tokio::test]
async fn heartbeat_latency_is_visible_in_status() {
    let state = test_state(&["modulo-pedidos-1"]);
    let sent_at = Utc::now() - Duration::seconds(2);

    let before = Utc::now();
    let (status, body) = send(
        &state,
        post_json(
            "/report/heartbeat",
            &json!({
                "id": "6f1c2a7e-0d7b-4a55-9b1e-2f0c7f3e9a10",
                "timestamp": bogota_timestamp(sent_at),
                "origin_service": "modulo-pedidos-1",
            }),
        ),
    )
    .await;
    let after = Utc::now();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["service"], "modulo-pedidos-1");

    let (status, snapshot) = send(&state, get("/status")).await;
    assert_eq!(status, StatusCode::OK);

    let entry = &snapshot["services"]["modulo-pedidos-1"];
    let latency = entry["last_latency_seconds"].as_f64().unwrap();
    let lower = (before - sent_at).num_milliseconds() as f64 / 1_000.0;
    let upper = (after - sent_at).num_milliseconds() as f64 / 1_000.0;
    assert!(
        latency >= lower - 0.05 && latency <= upper + 0.05,
        "latency {latency} outside [{lower}, {upper}]"
    );
    assert!(entry["last_seen"].as_str().is_some());
}

#[tokio::test]
async fn legacy_route_and_field_name_are_accepted() {
    let state = test_state(&[]);
    let (status, body) = send(
        &state,
        post_json(
            "/reportar-heartbeat",
            &json!({
                "timestamp": bogota_timestamp(Utc::now()),
                "servicio_origen": "modulo-pedidos-2",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "modulo-pedidos-2");
    assert!(state.liveness.get("modulo-pedidos-2").is_some());
}

#[tokio::test]
async fn missing_timestamp_is_rejected_without_mutation() {
    let state = test_state(&[]);
    let (status, body) = send(
        &state,
        post_json("/report/heartbeat", &json!({"origin_service": "modulo-pedidos-1"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "MISSING_TIMESTAMP");
    assert!(state.liveness.is_empty());

    let (_, snapshot) = send(&state, get("/status")).await;
    assert_eq!(snapshot["services"], json!({}));
}

#[tokio::test]
async fn blank_timestamp_counts_as_missing() {
    let state = test_state(&[]);
    let (status, body) = send(
        &state,
        post_json(
            "/report/heartbeat",
            &json!({"origin_service": "a", "timestamp": "  "}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_TIMESTAMP");
}

#[tokio::test]
async fn naive_timestamp_is_rejected() {
    let state = test_state(&[]);
    let (status, body) = send(
        &state,
        post_json(
            "/report/heartbeat",
            &json!({"origin_service": "a", "timestamp": "2025-03-01T08:30:00"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TIMESTAMP_FORMAT");
    assert!(state.liveness.is_empty());
}

#[tokio::test]
async fn non_json_and_empty_bodies_are_malformed() {
    let state = test_state(&[]);

    for raw in ["", "not json", "{}", "[1, 2]"] {
        let (status, body) = send(&state, post_raw("/report/heartbeat", raw)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {raw:?}");
        assert_eq!(body["code"], "MALFORMED_INPUT", "body {raw:?}");
    }
    assert!(state.liveness.is_empty());
}

#[tokio::test]
async fn missing_service_is_recorded_as_unknown() {
    let state = test_state(&[]);
    let (status, body) = send(
        &state,
        post_json(
            "/report/heartbeat",
            &json!({"timestamp": bogota_timestamp(Utc::now())}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "unknown");
    assert!(state.liveness.get("unknown").is_some());
}

#[tokio::test]
async fn future_timestamp_yields_negative_latency() {
    let state = test_state(&[]);
    let (status, body) = send(
        &state,
        post_json(
            "/report/heartbeat",
            &json!({
                "origin_service": "skewed",
                "timestamp": bogota_timestamp(Utc::now() + Duration::seconds(30)),
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["latency_seconds"].as_f64().unwrap() < -29.0);
}

#[tokio::test]
async fn sweep_status_classifies_watch_list() {
    let state = test_state(&["A", "B"]);
    send(
        &state,
        post_json(
            "/report/heartbeat",
            &json!({"origin_service": "A", "timestamp": bogota_timestamp(Utc::now())}),
        ),
    )
    .await;

    let (status, report) = send(&state, get("/status/sweep")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["services"][0]["service_name"], "A");
    assert_eq!(report["services"][0]["class"], "OK");
    assert_eq!(report["services"][1]["class"], "NEVER_SEEN");
    assert_eq!(report["alerts"].as_array().unwrap().len(), 1);
    assert_eq!(report["threshold_seconds"], 6.0);
}
