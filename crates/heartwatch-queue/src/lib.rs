//! Durable, at-least-once work queue backed by SQLite.
//!
//! Producers [`submit`](JobQueue::submit) a payload under a job type;
//! workers [`claim`](JobQueue::claim) the oldest eligible job for the types
//! they serve and [`ack`](JobQueue::ack) it once handled. A claim places a
//! lease on the job. If the lease expires without an acknowledgement (the
//! worker crashed or hung), the job becomes eligible again and is
//! redelivered, so consumers must tolerate duplicates.
//!
//! Jobs are handed out oldest-first, but redelivery and concurrent workers
//! mean no ordering guarantee is offered to consumers.
//!
//! # Usage
//!
//! ```rust,ignore
//! let queue = JobQueue::new(pool, QueueSettings::default());
//! let job_id = queue.submit("heartbeat_ping", payload).await?;
//!
//! if let Some(job) = queue.claim(vec!["heartbeat_ping".into()]).await? {
//!     handle(&job);
//!     queue.ack(job.job_id).await?;
//! }
//! ```

mod client;
mod error;
mod store;

pub use client::{JobQueue, QueueSettings};
pub use error::QueueError;
pub use store::{ack_job, claim_next_job, queue_depth, submit_job, Job, QueueDepth};
