//! Error types for the job queue.

/// Errors that can occur during queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// No connection could be obtained from the pool.
    #[error("queue connection unavailable: {0}")]
    Connection(#[from] r2d2::Error),

    /// A database operation failed.
    #[error("queue database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The payload could not be serialised.
    #[error("queue serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation did not finish within the configured bound.
    #[error("queue operation '{op}' timed out after {timeout_ms} ms")]
    Timeout {
        /// The operation that timed out.
        op: &'static str,
        /// The bound that was exceeded.
        timeout_ms: u128,
    },

    /// The blocking task running the operation panicked or was cancelled.
    #[error("queue task failed: {0}")]
    Task(String),
}
