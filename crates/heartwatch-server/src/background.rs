//! Background tasks for the Heartwatch server.
//!
//! Includes:
//! - Liveness sweeps over the watch list.
//! - Producer ticks.
//! - Queue worker loops.
//!
//! Every task stops when its [`CancellationToken`] is cancelled; see
//! [`stop_background_tasks`].

use chrono::Utc;
use heartwatch_liveness::Sweeper;
use heartwatch_queue::JobQueue;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::producer::Producer;
use crate::worker::Worker;

/// A periodic job driven by a tokio interval.
///
/// The first tick fires one period after [`run`](Self::run) starts. Ticks
/// are awaited one at a time, so a slow tick never overlaps the next one;
/// ticks missed meanwhile are skipped rather than replayed.
#[derive(Debug, Clone)]
pub struct RepeatingTask {
    name: String,
    period: Duration,
}

impl RepeatingTask {
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
        }
    }

    /// Runs `tick` every period until `token` is cancelled. A tick in
    /// progress is abandoned on cancellation.
    pub async fn run<F, Fut>(self, token: CancellationToken, mut tick: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            task = %self.name,
            period_ms = self.period.as_millis() as u64,
            "starting periodic task"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = tick() => {}
                    }
                }
            }
        }

        tracing::info!(task = %self.name, "periodic task stopped");
    }
}

/// Starts the liveness sweep task.
pub async fn start_sweeper_task(sweeper: Arc<Sweeper>, interval: Duration, token: CancellationToken) {
    tracing::info!(
        watched = sweeper.watch_list().len(),
        threshold_seconds = sweeper.threshold().as_secs_f64(),
        "liveness sweeper configured"
    );

    RepeatingTask::new("liveness-sweep", interval)
        .run(token, || {
            let sweeper = Arc::clone(&sweeper);
            async move {
                sweeper.tick(Utc::now());
            }
        })
        .await;
}

/// Starts the tick loop of one producer.
pub async fn start_producer_task(
    producer: Arc<Producer>,
    queue: JobQueue,
    interval: Duration,
    token: CancellationToken,
) {
    let name = format!("producer:{}", producer.name());
    RepeatingTask::new(name, interval)
        .run(token, || {
            let producer = Arc::clone(&producer);
            let queue = queue.clone();
            async move {
                // Failures are logged inside `tick`; the next tick is unaffected.
                let _ = producer.tick(&queue).await;
            }
        })
        .await;
}

/// Starts one worker loop.
///
/// The loop checks for cancellation only between jobs, so a job in flight
/// is always forwarded and acknowledged before the loop exits.
pub async fn start_worker_task(
    worker: Worker,
    worker_index: usize,
    idle_backoff: Duration,
    token: CancellationToken,
) {
    tracing::info!(
        worker = worker_index,
        job_types = ?worker.job_types(),
        "starting queue worker"
    );

    while !token.is_cancelled() {
        let backoff = match worker.process_one().await {
            Ok(Some(_)) => continue,
            Ok(None) => idle_backoff,
            Err(e) => {
                tracing::error!(worker = worker_index, error = %e, "queue worker failed to reach queue");
                idle_backoff
            }
        };

        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(backoff) => {}
        }
    }

    tracing::info!(worker = worker_index, "queue worker stopped");
}

/// Cancels `token` and waits up to `grace` for the given worker loops to
/// exit.
///
/// Once cancelled, workers claim nothing new, so jobs still queued stay in
/// the queue for the next start. Returns `false` if the grace period ran out
/// with jobs still in flight.
pub async fn stop_background_tasks(
    token: &CancellationToken,
    workers: Vec<JoinHandle<()>>,
    grace: Duration,
) -> bool {
    token.cancel();

    let count = workers.len();
    match tokio::time::timeout(grace, futures_util::future::join_all(workers)).await {
        Ok(_) => {
            tracing::info!(workers = count, "background tasks stopped");
            true
        }
        Err(_) => {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "workers did not stop within the grace period, abandoning in-flight jobs"
            );
            false
        }
    }
}
