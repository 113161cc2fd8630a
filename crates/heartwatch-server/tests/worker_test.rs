mod common;

use chrono::{FixedOffset, Utc};
use common::{memory_pool, memory_queue, test_state};
use heartwatch_access::AuthorizationStore;
use heartwatch_queue::{JobQueue, QueueSettings};
use heartwatch_server::worker::{DeliveryOutcome, DropReason, Worker};
use heartwatch_server::{app, AppState};
use heartwatch_types::{EventRecord, HeartbeatRecord, EVENT_JOB, HEARTBEAT_JOB};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use uuid::Uuid;

fn bogota() -> FixedOffset {
    FixedOffset::west_opt(5 * 3600).unwrap()
}

fn heartbeat(service: &str) -> HeartbeatRecord {
    HeartbeatRecord {
        id: Uuid::new_v4(),
        timestamp: Utc::now().with_timezone(&bogota()),
        origin_service: service.to_string(),
    }
}

/// Serves `state` on an ephemeral port and returns its address.
async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn routes_to(addr: SocketAddr) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            HEARTBEAT_JOB.to_string(),
            format!("http://{addr}/report/heartbeat"),
        ),
        (EVENT_JOB.to_string(), format!("http://{addr}/report/event")),
    ])
}

/// An address nothing listens on.
fn closed_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn heartbeat_is_delivered_end_to_end() {
    let state = test_state(&["modulo-pedidos-1"]);
    let addr = spawn_server(state.clone()).await;

    let queue = memory_queue();
    queue.submit(HEARTBEAT_JOB, heartbeat("modulo-pedidos-1")).await.unwrap();

    let worker = Worker::new(queue.clone(), routes_to(addr), Duration::from_secs(5)).unwrap();
    let outcome = worker.process_one().await.unwrap();

    assert_eq!(outcome, Some(DeliveryOutcome::Delivered { status: 200 }));
    assert!(state.liveness.get("modulo-pedidos-1").is_some());
    assert_eq!(queue.depth().await.unwrap().pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_event_is_acknowledged() {
    let state = test_state(&[]);
    state.validator.store().upsert(42, "CO", false).unwrap();
    let addr = spawn_server(state.clone()).await;

    let queue = memory_queue();
    let event = EventRecord {
        id: Uuid::new_v4(),
        timestamp: Utc::now().with_timezone(&bogota()),
        subject_id: 42,
        declared_country: "CO".to_string(),
    };
    queue.submit(EVENT_JOB, event).await.unwrap();

    let worker = Worker::new(queue.clone(), routes_to(addr), Duration::from_secs(5)).unwrap();
    let outcome = worker.process_one().await.unwrap();

    assert_eq!(outcome, Some(DeliveryOutcome::Rejected { status: 403 }));
    let depth = queue.depth().await.unwrap();
    assert_eq!(depth.pending + depth.in_flight, 0);
    assert!(state.liveness.is_empty());
}

#[tokio::test]
async fn unreachable_reporter_drops_the_job() {
    let queue = memory_queue();
    queue.submit(HEARTBEAT_JOB, heartbeat("modulo-pedidos-2")).await.unwrap();

    let worker = Worker::new(
        queue.clone(),
        routes_to(closed_port()),
        Duration::from_millis(500),
    )
    .unwrap();
    let outcome = worker.process_one().await.unwrap();

    assert!(matches!(
        outcome,
        Some(DeliveryOutcome::Dropped(DropReason::Unreachable(_)))
    ));
    let depth = queue.depth().await.unwrap();
    assert_eq!(depth.pending + depth.in_flight, 0);

    assert_eq!(worker.process_one().await.unwrap(), None);
}

#[tokio::test]
async fn undecodable_payload_is_dropped() {
    let pool = memory_pool();
    {
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO jobs (job_id, job_type, payload_json) VALUES (?1, ?2, ?3)",
            rusqlite::params![Uuid::new_v4().to_string(), HEARTBEAT_JOB, "{not json"],
        )
        .unwrap();
    }
    let queue = JobQueue::new(pool, QueueSettings::default());

    let worker = Worker::new(
        queue.clone(),
        routes_to(closed_port()),
        Duration::from_millis(500),
    )
    .unwrap();
    let outcome = worker.process_one().await.unwrap();

    assert_eq!(
        outcome,
        Some(DeliveryOutcome::Dropped(DropReason::UndecodablePayload))
    );
    assert_eq!(queue.depth().await.unwrap().pending, 0);
}

#[tokio::test]
async fn worker_only_claims_routed_job_types() {
    let queue = memory_queue();
    queue.submit(EVENT_JOB, serde_json::json!({"subject_id": 1})).await.unwrap();

    let routes = BTreeMap::from([(
        HEARTBEAT_JOB.to_string(),
        format!("http://{}/report/heartbeat", closed_port()),
    )]);
    let worker = Worker::new(queue.clone(), routes, Duration::from_millis(500)).unwrap();

    assert_eq!(worker.job_types(), [HEARTBEAT_JOB.to_string()]);
    assert_eq!(worker.process_one().await.unwrap(), None);
    assert_eq!(queue.depth().await.unwrap().pending, 1);
}
