//! Destinations for liveness alerts.

use heartwatch_types::{AlertEvent, AlertKind};
use tokio::sync::broadcast;

/// Receives every alert produced by a sweep.
///
/// Sinks are called synchronously from the sweep and must not block.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: &AlertEvent);
}

/// Writes alerts to the log at `warn` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn emit(&self, alert: &AlertEvent) {
        match alert.kind {
            AlertKind::TimedOut => tracing::warn!(
                service = %alert.service_name,
                last_seen = ?alert.since,
                silent_for_seconds = alert.silent_for_seconds,
                "service timed out"
            ),
            AlertKind::NeverSeen => tracing::warn!(
                service = %alert.service_name,
                "service has never reported"
            ),
        }
    }
}

/// Fans alerts out to live subscribers, such as SSE clients.
///
/// Alerts sent while nobody is subscribed are discarded.
#[derive(Debug, Clone)]
pub struct BroadcastAlertSink {
    tx: broadcast::Sender<AlertEvent>,
}

impl BroadcastAlertSink {
    pub fn new(tx: broadcast::Sender<AlertEvent>) -> Self {
        Self { tx }
    }
}

impl AlertSink for BroadcastAlertSink {
    fn emit(&self, alert: &AlertEvent) {
        let _ = self.tx.send(alert.clone());
    }
}
