//! Async handle over the SQLite queue store.

use chrono::Utc;
use heartwatch_db::DbPool;
use rusqlite::Connection;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::error::QueueError;
use crate::store::{self, Job, QueueDepth};

/// Timing parameters for queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// How long a claimed job stays invisible to other workers.
    pub lease: Duration,
    /// Upper bound on any single queue operation, pool wait included.
    pub op_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(30),
            op_timeout: Duration::from_secs(5),
        }
    }
}

/// Cloneable async front end for the queue.
///
/// Every operation runs on the blocking pool and is bounded by
/// [`QueueSettings::op_timeout`], so an unreachable queue surfaces as an
/// error instead of stalling the caller.
#[derive(Clone)]
pub struct JobQueue {
    pool: DbPool,
    settings: QueueSettings,
}

impl JobQueue {
    pub fn new(pool: DbPool, settings: QueueSettings) -> Self {
        Self { pool, settings }
    }

    /// Submits a payload under `job_type`.
    ///
    /// A submission that times out may still complete in the background.
    /// Delivery is at-least-once, so callers treat that as harmless.
    pub async fn submit<T>(&self, job_type: &str, payload: T) -> Result<Uuid, QueueError>
    where
        T: Serialize + Send + 'static,
    {
        let job_type = job_type.to_string();
        self.run_blocking("submit", move |conn| {
            store::submit_job(conn, &job_type, &payload)
        })
        .await
    }

    /// Claims the oldest eligible job among `job_types`, if any.
    pub async fn claim(&self, job_types: Vec<String>) -> Result<Option<Job>, QueueError> {
        let lease = self.settings.lease;
        self.run_blocking("claim", move |conn| {
            store::claim_next_job(conn, &job_types, Utc::now().timestamp_millis(), lease)
        })
        .await
    }

    /// Acknowledges a job. Returns `false` if it was already gone.
    pub async fn ack(&self, job_id: Uuid) -> Result<bool, QueueError> {
        self.run_blocking("ack", move |conn| store::ack_job(conn, job_id))
            .await
    }

    pub async fn depth(&self) -> Result<QueueDepth, QueueError> {
        self.run_blocking("depth", |conn| {
            store::queue_depth(conn, Utc::now().timestamp_millis())
        })
        .await
    }

    async fn run_blocking<T, F>(&self, op: &'static str, f: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, QueueError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let task = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        });

        match tokio::time::timeout(self.settings.op_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(QueueError::Task(join_err.to_string())),
            Err(_) => {
                tracing::warn!(
                    op,
                    timeout_ms = self.settings.op_timeout.as_millis() as u64,
                    "queue operation timed out"
                );
                Err(QueueError::Timeout {
                    op,
                    timeout_ms: self.settings.op_timeout.as_millis(),
                })
            }
        }
    }
}
