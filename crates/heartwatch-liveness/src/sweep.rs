//! Liveness classification and the periodic sweep.

use chrono::{DateTime, Utc};
use heartwatch_types::{AlertEvent, AlertKind};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::alerts::AlertSink;
use crate::registry::{LivenessRegistry, ServiceLivenessState};

/// Outcome of classifying one watched service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LivenessClass {
    Ok,
    TimedOut,
    NeverSeen,
}

/// Classifies a service from its state at `now`.
///
/// A service is timed out only once its silence strictly exceeds
/// `threshold`. A `last_seen` in the future counts as fresh.
pub fn classify(
    state: Option<&ServiceLivenessState>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> LivenessClass {
    let Some(last_seen) = state.and_then(|s| s.last_seen) else {
        return LivenessClass::NeverSeen;
    };

    match (now - last_seen).to_std() {
        Ok(age) if age > threshold => LivenessClass::TimedOut,
        _ => LivenessClass::Ok,
    }
}

/// Classification of one service within a [`SweepReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub service_name: String,
    pub class: LivenessClass,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_latency_seconds: Option<f64>,
    pub silent_for_seconds: Option<f64>,
}

/// Result of one sweep over the watch list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub swept_at: DateTime<Utc>,
    pub threshold_seconds: f64,
    /// One entry per watched service, in watch-list order.
    pub services: Vec<ServiceStatus>,
    /// One alert per non-OK service.
    pub alerts: Vec<AlertEvent>,
}

impl SweepReport {
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }

    pub fn ok_count(&self) -> usize {
        self.services
            .iter()
            .filter(|s| s.class == LivenessClass::Ok)
            .count()
    }
}

fn seconds_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1_000.0
}

/// Classifies every service in `watch_list` against the registry.
///
/// Pure: emits nothing and never fails. Services missing from the registry
/// are reported as [`LivenessClass::NeverSeen`].
pub fn sweep(
    registry: &LivenessRegistry,
    watch_list: &[String],
    now: DateTime<Utc>,
    threshold: Duration,
) -> SweepReport {
    let mut services = Vec::with_capacity(watch_list.len());
    let mut alerts = Vec::new();

    for service_name in watch_list {
        let state = registry.get(service_name);
        let class = classify(state.as_ref(), now, threshold);
        let last_seen = state.and_then(|s| s.last_seen);
        let silent_for_seconds = last_seen.map(|seen| seconds_between(now, seen));

        let kind = match class {
            LivenessClass::Ok => None,
            LivenessClass::TimedOut => Some(AlertKind::TimedOut),
            LivenessClass::NeverSeen => Some(AlertKind::NeverSeen),
        };
        if let Some(kind) = kind {
            alerts.push(AlertEvent {
                service_name: service_name.clone(),
                kind,
                since: last_seen,
                silent_for_seconds,
            });
        }

        services.push(ServiceStatus {
            service_name: service_name.clone(),
            class,
            last_seen,
            last_latency_seconds: state.and_then(|s| s.last_latency_seconds),
            silent_for_seconds,
        });
    }

    SweepReport {
        swept_at: now,
        threshold_seconds: threshold.as_secs_f64(),
        services,
        alerts,
    }
}

/// Runs sweeps over a fixed watch list and dispatches the alerts.
pub struct Sweeper {
    registry: Arc<LivenessRegistry>,
    watch_list: Vec<String>,
    threshold: Duration,
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl Sweeper {
    pub fn new(registry: Arc<LivenessRegistry>, watch_list: Vec<String>, threshold: Duration) -> Self {
        Self {
            registry,
            watch_list,
            threshold,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn watch_list(&self) -> &[String] {
        &self.watch_list
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Classifies the watch list without emitting anything.
    pub fn evaluate(&self, now: DateTime<Utc>) -> SweepReport {
        sweep(&self.registry, &self.watch_list, now, self.threshold)
    }

    /// Performs one sweep: classifies, emits every alert to every sink and
    /// logs a summary.
    pub fn tick(&self, now: DateTime<Utc>) -> SweepReport {
        let report = self.evaluate(now);

        for status in &report.services {
            if status.class == LivenessClass::Ok {
                tracing::debug!(
                    service = %status.service_name,
                    silent_for_seconds = status.silent_for_seconds,
                    "service alive"
                );
            }
        }

        for alert in &report.alerts {
            for sink in &self.sinks {
                sink.emit(alert);
            }
        }

        if report.has_alerts() {
            tracing::warn!(
                watched = report.services.len(),
                ok = report.ok_count(),
                alerts = report.alerts.len(),
                "liveness sweep found silent services"
            );
        } else {
            tracing::info!(
                watched = report.services.len(),
                "liveness sweep: all services alive"
            );
        }

        report
    }
}
