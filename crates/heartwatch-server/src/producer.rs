//! Producer nodes: build one heartbeat or event per tick and queue it.

use chrono::{DateTime, FixedOffset, Utc};
use heartwatch_queue::{JobQueue, QueueError};
use heartwatch_types::{ErrorCode, EventRecord, HeartbeatRecord, EVENT_JOB, HEARTBEAT_JOB};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{ConfigError, ProducerInstanceConfig, ProducerKindConfig, ProducersConfig};

/// What a producer emits on each tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerKind {
    Heartbeat,
    Event {
        subject_id_max: i64,
        /// Never empty.
        countries: Vec<String>,
    },
}

/// A record ready for submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProducedRecord {
    Heartbeat(HeartbeatRecord),
    Event(EventRecord),
}

impl ProducedRecord {
    pub fn job_type(&self) -> &'static str {
        match self {
            Self::Heartbeat(_) => HEARTBEAT_JOB,
            Self::Event(_) => EVENT_JOB,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Heartbeat(r) => r.id,
            Self::Event(r) => r.id,
        }
    }
}

/// One configured producer node.
#[derive(Debug, Clone)]
pub struct Producer {
    name: String,
    kind: ProducerKind,
    offset: FixedOffset,
}

impl Producer {
    pub fn heartbeat(name: impl Into<String>, offset: FixedOffset) -> Self {
        Self {
            name: name.into(),
            kind: ProducerKind::Heartbeat,
            offset,
        }
    }

    /// Creates an event producer. Returns `None` if there are no countries
    /// to draw from or `subject_id_max` is below 1.
    pub fn event(
        name: impl Into<String>,
        offset: FixedOffset,
        subject_id_max: i64,
        countries: Vec<String>,
    ) -> Option<Self> {
        let countries: Vec<String> = countries
            .into_iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        if countries.is_empty() || subject_id_max < 1 {
            return None;
        }
        Some(Self {
            name: name.into(),
            kind: ProducerKind::Event {
                subject_id_max,
                countries,
            },
            offset,
        })
    }

    /// Builds a producer from its configuration entry.
    pub fn from_config(
        instance: &ProducerInstanceConfig,
        shared: &ProducersConfig,
    ) -> Result<Self, ConfigError> {
        let offset = shared.offset()?;
        match instance.kind {
            ProducerKindConfig::Heartbeat => Ok(Self::heartbeat(instance.name.clone(), offset)),
            ProducerKindConfig::Event => Self::event(
                instance.name.clone(),
                offset,
                shared.subject_id_max,
                shared.countries.clone(),
            )
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "event producer '{}' needs countries and a positive subject_id_max",
                    instance.name
                ))
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ProducerKind {
        &self.kind
    }

    /// Builds the record for a tick at `now`.
    pub fn build_record<R: Rng + ?Sized>(&self, now: DateTime<Utc>, rng: &mut R) -> ProducedRecord {
        let id = Uuid::new_v4();
        let timestamp = now.with_timezone(&self.offset);

        match &self.kind {
            ProducerKind::Heartbeat => ProducedRecord::Heartbeat(HeartbeatRecord {
                id,
                timestamp,
                origin_service: self.name.clone(),
            }),
            ProducerKind::Event {
                subject_id_max,
                countries,
            } => ProducedRecord::Event(EventRecord {
                id,
                timestamp,
                subject_id: rng.gen_range(1..=*subject_id_max),
                declared_country: countries.choose(rng).cloned().unwrap_or_default(),
            }),
        }
    }

    /// Runs one tick: builds a record and submits it.
    ///
    /// Failures are logged here and returned for the caller's bookkeeping;
    /// they never affect later ticks.
    pub async fn tick(&self, queue: &JobQueue) -> Result<Uuid, QueueError> {
        let record = self.build_record(Utc::now(), &mut rand::thread_rng());
        let job_type = record.job_type();
        let record_id = record.id();

        match queue.submit(job_type, record).await {
            Ok(job_id) => {
                tracing::info!(
                    producer = %self.name,
                    job_type,
                    %record_id,
                    %job_id,
                    "queued record"
                );
                Ok(job_id)
            }
            Err(e) => {
                tracing::error!(
                    producer = %self.name,
                    job_type,
                    code = %ErrorCode::QueueUnavailable,
                    error = %e,
                    "failed to queue record, skipping tick"
                );
                Err(e)
            }
        }
    }
}
