#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use heartwatch_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use heartwatch_queue::{JobQueue, QueueSettings};
use heartwatch_server::{app, AppState, MonitorSettings};
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

/// Single-connection in-memory pool so every checkout sees the same data.
pub fn memory_pool() -> DbPool {
    let pool = create_pool(
        ":memory:",
        DbRuntimeSettings {
            pool_max_size: 1,
            ..DbRuntimeSettings::default()
        },
    )
    .expect("pool creation should succeed");
    {
        let conn = pool.get().expect("connection should succeed");
        run_migrations(&conn).expect("migrations should succeed");
    }
    pool
}

pub fn memory_queue() -> JobQueue {
    JobQueue::new(memory_pool(), QueueSettings::default())
}

pub fn test_state(watch_list: &[&str]) -> AppState {
    AppState::new(
        memory_pool(),
        memory_queue(),
        MonitorSettings {
            watch_list: watch_list.iter().map(|s| s.to_string()).collect(),
            threshold: Duration::from_secs(6),
            event_source: "logistica".to_string(),
        },
    )
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn put_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn post_raw(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::from(body))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Sends one request through a fresh router over `state`.
pub async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let router: Router = app(state.clone());
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}
