//! Heartwatch server library logic.
//!
//! One process hosts every stage of the pipeline: producer ticks feed the
//! durable queue, workers forward queued jobs to the reporting endpoints
//! served here, and the sweeper turns the resulting liveness map into
//! alerts.

pub mod api;
pub mod api_admin;
pub mod api_sse;
pub mod background;
pub mod config;
pub mod logging;
pub mod producer;
pub mod worker;

use axum::{
    extract::{DefaultBodyLimit, Extension},
    routing::{get, post},
    Json, Router,
};
use heartwatch_access::{AccessValidator, AuthorizationStore, SqliteAuthorizationStore};
use heartwatch_db::DbPool;
use heartwatch_liveness::{BroadcastAlertSink, LivenessRegistry, Sweeper, TracingAlertSink};
use heartwatch_queue::JobQueue;
use heartwatch_types::AlertEvent;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Capacity of the alert broadcast channel. Slow SSE subscribers lag
/// beyond this.
const ALERT_CHANNEL_CAPACITY: usize = 256;

/// Maximum request body size (64 KiB). Reports are small JSON objects.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Liveness settings needed to build an [`AppState`].
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub watch_list: Vec<String>,
    pub threshold: Duration,
    /// Name under which allowed events are recorded.
    pub event_source: String,
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Pool of the authorization database.
    pub pool: DbPool,
    pub queue: JobQueue,
    pub liveness: Arc<LivenessRegistry>,
    pub sweeper: Arc<Sweeper>,
    pub validator: AccessValidator,
    /// Broadcast channel for liveness alerts (SSE stream).
    pub alert_tx: broadcast::Sender<AlertEvent>,
    pub event_source: String,
    /// Cancelled when the HTTP server begins shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wires the registry, sweeper and validator around the given stores.
    ///
    /// Alerts go to the log and to the SSE broadcast channel.
    pub fn new(pool: DbPool, queue: JobQueue, monitor: MonitorSettings) -> Self {
        let store: Arc<dyn AuthorizationStore> = Arc::new(SqliteAuthorizationStore::new(pool.clone()));
        Self::with_store(pool, queue, store, monitor)
    }

    pub fn with_store(
        pool: DbPool,
        queue: JobQueue,
        store: Arc<dyn AuthorizationStore>,
        monitor: MonitorSettings,
    ) -> Self {
        let liveness = Arc::new(LivenessRegistry::new());
        let (alert_tx, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);

        let sweeper = Sweeper::new(Arc::clone(&liveness), monitor.watch_list, monitor.threshold)
            .with_sink(Arc::new(TracingAlertSink))
            .with_sink(Arc::new(BroadcastAlertSink::new(alert_tx.clone())));

        Self {
            pool,
            queue,
            liveness,
            sweeper: Arc::new(sweeper),
            validator: AccessValidator::new(store),
            alert_tx,
            event_source: monitor.event_source,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Health check handler.
///
/// Includes the queue depth when the queue answers.
async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let queue = match state.queue.depth().await {
        Ok(depth) => json!(depth),
        Err(e) => {
            tracing::warn!(error = %e, "queue depth unavailable for health check");
            Value::Null
        }
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "queue": queue,
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/report/heartbeat", post(api::report_heartbeat_handler))
        .route("/reportar-heartbeat", post(api::report_heartbeat_handler))
        .route("/report/event", post(api::report_event_handler))
        .route("/reportar-evento", post(api::report_event_handler))
        .route("/status", get(api::status_handler))
        .route("/status/sweep", get(api::sweep_status_handler))
        .route("/events/alerts", get(api_sse::get_alert_stream_handler))
        .route(
            "/api/authorizations/{subjectId}",
            get(api_admin::get_authorization_handler).put(api_admin::put_authorization_handler),
        )
        .route(
            "/api/authorizations/{subjectId}/reinstate",
            post(api_admin::reinstate_authorization_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
