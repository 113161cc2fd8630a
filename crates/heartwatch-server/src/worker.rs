//! Queue consumer that forwards each job to its reporter endpoint.
//!
//! Forwarding is attempted once. Whatever happens, the job is acknowledged,
//! so a reporter that is down loses the jobs routed to it during the outage.

use heartwatch_queue::{Job, JobQueue, QueueError};
use heartwatch_types::ErrorCode;
use std::collections::BTreeMap;
use std::time::Duration;

/// Why a job was acknowledged without reaching its reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The payload is not valid JSON.
    UndecodablePayload,
    /// No reporter URL is configured for the job type.
    NoRoute,
    /// The reporter could not be reached or did not answer in time.
    Unreachable(String),
}

/// Result of handling one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The reporter accepted the job.
    Delivered { status: u16 },
    /// The reporter answered with a non-success status.
    Rejected { status: u16 },
    Dropped(DropReason),
}

/// One logical consumer. Cheap to clone; clones share the HTTP client.
#[derive(Clone)]
pub struct Worker {
    queue: JobQueue,
    client: reqwest::Client,
    routes: BTreeMap<String, String>,
    job_types: Vec<String>,
}

impl Worker {
    /// Creates a worker serving every job type present in `routes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        queue: JobQueue,
        routes: BTreeMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("heartwatch-worker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let job_types = routes.keys().cloned().collect();

        Ok(Self {
            queue,
            client,
            routes,
            job_types,
        })
    }

    pub fn job_types(&self) -> &[String] {
        &self.job_types
    }

    /// Claims, forwards and acknowledges at most one job.
    ///
    /// Returns `Ok(None)` when the queue had nothing for this worker.
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the claim or the acknowledgement fails. A job
    /// whose acknowledgement failed is redelivered once its lease expires.
    pub async fn process_one(&self) -> Result<Option<DeliveryOutcome>, QueueError> {
        let Some(job) = self.queue.claim(self.job_types.clone()).await? else {
            return Ok(None);
        };

        if job.is_redelivery() {
            tracing::debug!(
                job_id = %job.job_id,
                attempts = job.attempts,
                "processing redelivered job"
            );
        }

        let outcome = self.forward(&job).await;
        self.log_outcome(&job, &outcome);
        self.queue.ack(job.job_id).await?;

        Ok(Some(outcome))
    }

    /// Forwards one job to its reporter. Never retries.
    pub async fn forward(&self, job: &Job) -> DeliveryOutcome {
        let payload = match job.payload() {
            Ok(payload) => payload,
            Err(_) => return DeliveryOutcome::Dropped(DropReason::UndecodablePayload),
        };
        let Some(url) = self.routes.get(&job.job_type) else {
            return DeliveryOutcome::Dropped(DropReason::NoRoute);
        };

        match self.client.post(url).json(&payload).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    DeliveryOutcome::Delivered {
                        status: status.as_u16(),
                    }
                } else {
                    DeliveryOutcome::Rejected {
                        status: status.as_u16(),
                    }
                }
            }
            Err(e) => DeliveryOutcome::Dropped(DropReason::Unreachable(e.to_string())),
        }
    }

    fn log_outcome(&self, job: &Job, outcome: &DeliveryOutcome) {
        let url = self.routes.get(&job.job_type).map(String::as_str);
        match outcome {
            DeliveryOutcome::Delivered { status } => tracing::info!(
                job_id = %job.job_id,
                job_type = %job.job_type,
                url,
                status,
                "forwarded job to reporter"
            ),
            DeliveryOutcome::Rejected { status } => tracing::warn!(
                job_id = %job.job_id,
                job_type = %job.job_type,
                url,
                status,
                "reporter rejected job, dropping"
            ),
            DeliveryOutcome::Dropped(DropReason::Unreachable(error)) => tracing::error!(
                job_id = %job.job_id,
                job_type = %job.job_type,
                url,
                code = %ErrorCode::DownstreamUnreachable,
                error = %error,
                "reporter unreachable, dropping job"
            ),
            DeliveryOutcome::Dropped(DropReason::UndecodablePayload) => tracing::error!(
                job_id = %job.job_id,
                job_type = %job.job_type,
                "job payload is not valid JSON, dropping"
            ),
            DeliveryOutcome::Dropped(DropReason::NoRoute) => tracing::error!(
                job_id = %job.job_id,
                job_type = %job.job_type,
                "no reporter configured for job type, dropping"
            ),
        }
    }
}
