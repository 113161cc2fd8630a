//! Persistence operations for the job queue.
//!
//! Every state change is a single SQL statement, so concurrent workers on
//! separate pooled connections can never claim the same job twice within
//! one lease.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::error::QueueError;

/// A job handed to a worker by [`claim_next_job`].
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Identifier assigned at submission.
    pub job_id: Uuid,
    /// The job type the job was submitted under.
    pub job_type: String,
    /// The payload exactly as submitted, as a JSON string.
    pub payload_json: String,
    /// Number of times this job has been claimed, including this claim.
    pub attempts: u32,
    /// ISO 8601 submission time.
    pub enqueued_at: String,
}

impl Job {
    /// Decodes the payload as structured JSON.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.payload_json)
    }

    /// Whether this claim is a redelivery after an expired lease.
    pub fn is_redelivery(&self) -> bool {
        self.attempts > 1
    }
}

/// Snapshot of queue occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    /// Jobs waiting to be claimed, including those whose lease expired.
    pub pending: u64,
    /// Jobs currently held under an unexpired lease.
    pub in_flight: u64,
}

/// Inserts a job and returns its identifier.
///
/// # Errors
///
/// Returns `QueueError::Serialization` if the payload cannot be encoded or
/// `QueueError::Database` on SQL failure.
pub fn submit_job<T: Serialize + ?Sized>(
    conn: &Connection,
    job_type: &str,
    payload: &T,
) -> Result<Uuid, QueueError> {
    let payload_json = serde_json::to_string(payload)?;
    let job_id = Uuid::new_v4();

    conn.execute(
        "INSERT INTO jobs (job_id, job_type, payload_json) VALUES (?1, ?2, ?3)",
        params![job_id.to_string(), job_type, payload_json],
    )?;

    Ok(job_id)
}

/// Claims the oldest eligible job of one of `job_types`.
///
/// A job is eligible when it has never been claimed or its lease ended at
/// or before `now_ms`. The claim sets a new lease of `lease` from `now_ms`
/// and increments the attempt counter in the same statement.
///
/// Returns `Ok(None)` when nothing is eligible.
///
/// # Errors
///
/// Returns `QueueError::Database` on SQL failure.
pub fn claim_next_job(
    conn: &Connection,
    job_types: &[String],
    now_ms: i64,
    lease: Duration,
) -> Result<Option<Job>, QueueError> {
    if job_types.is_empty() {
        return Ok(None);
    }

    let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
    let lease_until = now_ms.saturating_add(lease_ms);

    // ?1 and ?2 are the lease bounds; job types bind from ?3 onwards.
    let placeholders: Vec<String> = (0..job_types.len()).map(|i| format!("?{}", i + 3)).collect();
    let sql = format!(
        "UPDATE jobs
         SET lease_expires_at_ms = ?1, attempts = attempts + 1
         WHERE seq = (
            SELECT seq FROM jobs
            WHERE job_type IN ({})
              AND (lease_expires_at_ms IS NULL OR lease_expires_at_ms <= ?2)
            ORDER BY seq ASC
            LIMIT 1
         )
         RETURNING job_id, job_type, payload_json, attempts, enqueued_at",
        placeholders.join(", ")
    );

    let mut param_values: Vec<&dyn rusqlite::types::ToSql> = vec![&lease_until, &now_ms];
    for job_type in job_types {
        param_values.push(job_type);
    }

    let row = conn
        .query_row(&sql, param_values.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .optional()?;

    let Some((job_id, job_type, payload_json, attempts, enqueued_at)) = row else {
        return Ok(None);
    };

    let job_id = Uuid::parse_str(&job_id).map_err(|e| {
        QueueError::Database(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(e),
        ))
    })?;

    Ok(Some(Job {
        job_id,
        job_type,
        payload_json,
        attempts,
        enqueued_at,
    }))
}

/// Removes a handled job from the queue.
///
/// Returns `false` if the job was already acknowledged, which happens when a
/// redelivered duplicate finishes after the original.
///
/// # Errors
///
/// Returns `QueueError::Database` on SQL failure.
pub fn ack_job(conn: &Connection, job_id: Uuid) -> Result<bool, QueueError> {
    let deleted = conn.execute(
        "DELETE FROM jobs WHERE job_id = ?1",
        params![job_id.to_string()],
    )?;
    Ok(deleted > 0)
}

/// Counts pending and in-flight jobs as of `now_ms`.
///
/// # Errors
///
/// Returns `QueueError::Database` on SQL failure.
pub fn queue_depth(conn: &Connection, now_ms: i64) -> Result<QueueDepth, QueueError> {
    let (pending, in_flight): (i64, i64) = conn.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN lease_expires_at_ms IS NULL OR lease_expires_at_ms <= ?1 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN lease_expires_at_ms > ?1 THEN 1 ELSE 0 END), 0)
         FROM jobs",
        params![now_ms],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(QueueDepth {
        pending: pending.max(0) as u64,
        in_flight: in_flight.max(0) as u64,
    })
}
