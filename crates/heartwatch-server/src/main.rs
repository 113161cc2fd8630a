//! Heartwatch server binary.
//!
//! Starts the reporting HTTP server, the liveness sweeper, the configured
//! producers and the queue workers. On SIGTERM/SIGINT the background tasks
//! stop first, then the HTTP server drains.

use heartwatch_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use heartwatch_queue::{JobQueue, QueueSettings};
use heartwatch_server::background::{
    start_producer_task, start_sweeper_task, start_worker_task, stop_background_tasks,
};
use heartwatch_server::config::{self, Config};
use heartwatch_server::producer::Producer;
use heartwatch_server::worker::Worker;
use heartwatch_server::{app, logging, AppState, MonitorSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Logging(#[from] logging::LoggingError),

    #[error("{store}: {source}")]
    Pool {
        store: &'static str,
        source: heartwatch_db::PoolError,
    },

    #[error("{store}: failed to get connection for migrations: {source}")]
    Connection {
        store: &'static str,
        source: r2d2::Error,
    },

    #[error("{store}: {source}")]
    Migration {
        store: &'static str,
        source: heartwatch_db::MigrationError,
    },

    #[error("failed to seed authorizations: {0}")]
    Seed(#[from] heartwatch_access::AccessError),

    #[error("failed to build worker HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(std::io::Error),

    #[error("startup task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("HEARTWATCH_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

/// Opens a pool and brings its schema up to date.
fn open_store(
    store: &'static str,
    path: &str,
    settings: DbRuntimeSettings,
) -> Result<DbPool, StartupError> {
    let pool = create_pool(path, settings).map_err(|source| StartupError::Pool { store, source })?;

    let conn = pool
        .get()
        .map_err(|source| StartupError::Connection { store, source })?;
    let applied =
        run_migrations(&conn).map_err(|source| StartupError::Migration { store, source })?;
    if applied > 0 {
        tracing::info!(store, path, count = applied, "applied database migrations");
    }

    Ok(pool)
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // The subscriber may not be installed yet.
        eprintln!("heartwatch-server: {e}");
        tracing::error!(error = %e, "heartwatch server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)?;
    let _logging_guard = logging::init_tracing(&config.logging)?;

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let db_config = config.database.clone();
    let queue_config = config.queue.clone();
    let (pool, queue_pool) = tokio::task::spawn_blocking(move || {
        let pool = open_store(
            "authorization store",
            &db_config.path,
            DbRuntimeSettings {
                busy_timeout_ms: db_config.busy_timeout_ms,
                pool_max_size: db_config.pool_max_size,
                ..DbRuntimeSettings::default()
            },
        )?;
        let queue_pool = open_store(
            "job queue",
            &queue_config.path,
            DbRuntimeSettings {
                busy_timeout_ms: db_config.busy_timeout_ms,
                pool_max_size: queue_config.pool_max_size,
                ..DbRuntimeSettings::default()
            },
        )?;
        Ok::<_, StartupError>((pool, queue_pool))
    })
    .await??;

    let queue = JobQueue::new(
        queue_pool,
        QueueSettings {
            lease: Duration::from_secs(config.queue.lease_seconds),
            op_timeout: Duration::from_millis(config.queue.op_timeout_ms),
        },
    );

    let state = AppState::new(
        pool,
        queue.clone(),
        MonitorSettings {
            watch_list: config.monitor.watch_list.clone(),
            threshold: config.monitor.threshold(),
            event_source: config.monitor.event_source.clone(),
        },
    );

    seed_authorizations(&state, &config).await?;

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;

    let background = CancellationToken::new();
    let workers = spawn_background_tasks(&state, &config, &queue, &background)?;

    let http_shutdown = state.shutdown.clone();
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let app = app(state);

    tracing::info!(%addr, "starting heartwatch server");

    // Workers deliver to this listener, so they are stopped while it still
    // accepts connections.
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            stop_background_tasks(&background, workers, grace).await;
            tracing::info!("draining http server");
            http_shutdown.cancel();
        })
        .await;

    tracing::info!("heartwatch server shut down");
    served.map_err(StartupError::Serve)
}

/// Registers the configured subjects that are not yet known.
async fn seed_authorizations(state: &AppState, config: &Config) -> Result<(), StartupError> {
    if config.access.seed.is_empty() {
        return Ok(());
    }

    let store = Arc::clone(state.validator.store());
    let seeds = config.access.seed.clone();
    let inserted = tokio::task::spawn_blocking(move || {
        let mut inserted = 0usize;
        for seed in &seeds {
            if store.insert_if_absent(seed.subject_id, &seed.origin_country, seed.access_enabled)? {
                inserted += 1;
            }
        }
        Ok::<_, heartwatch_access::AccessError>(inserted)
    })
    .await??;

    tracing::info!(
        configured = config.access.seed.len(),
        inserted,
        "seeded authorizations"
    );
    Ok(())
}

/// Spawns the sweeper, producers and workers. Returns the worker handles,
/// which are the only tasks awaited on shutdown.
fn spawn_background_tasks(
    state: &AppState,
    config: &Config,
    queue: &JobQueue,
    token: &CancellationToken,
) -> Result<Vec<JoinHandle<()>>, StartupError> {
    tokio::spawn(start_sweeper_task(
        Arc::clone(&state.sweeper),
        config.monitor.sweep_interval(),
        token.child_token(),
    ));

    for instance in &config.producers.instances {
        let producer = Producer::from_config(instance, &config.producers)?;
        tokio::spawn(start_producer_task(
            Arc::new(producer),
            queue.clone(),
            config.producers.interval_for(instance),
            token.child_token(),
        ));
    }

    let mut workers = Vec::with_capacity(config.worker.concurrency);
    if config.worker.concurrency > 0 {
        let routes = config.worker.resolved_routes(&config.server);
        tracing::info!(?routes, concurrency = config.worker.concurrency, "worker routes");

        let worker = Worker::new(
            queue.clone(),
            routes,
            Duration::from_millis(config.worker.request_timeout_ms),
        )?;
        let idle_backoff = Duration::from_millis(config.worker.idle_backoff_ms);

        for index in 0..config.worker.concurrency {
            workers.push(tokio::spawn(start_worker_task(
                worker.clone(),
                index,
                idle_backoff,
                token.child_token(),
            )));
        }
    } else {
        tracing::info!("queue worker disabled");
    }

    Ok(workers)
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
///
/// A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
