use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Last known liveness of one service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ServiceLivenessState {
    /// Monitor-side receive time of the most recent report.
    pub last_seen: Option<DateTime<Utc>>,
    /// Delivery latency of the most recent report. May be negative when the
    /// producer's clock runs ahead of the monitor's.
    pub last_latency_seconds: Option<f64>,
}

/// Shared map of service name to [`ServiceLivenessState`].
///
/// Entries are created on first report and never removed. Each state is
/// replaced as one value, so readers never see a `last_seen` from one
/// report paired with the latency of another.
#[derive(Debug, Default)]
pub struct LivenessRegistry {
    services: RwLock<HashMap<String, ServiceLivenessState>>,
}

impl LivenessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, service_name: &str) -> Option<ServiceLivenessState> {
        let services = self.services.read().unwrap_or_else(|e| e.into_inner());
        services.get(service_name).copied()
    }

    /// Replaces the state of `service_name`. Last arrival wins, regardless
    /// of the timestamps embedded in the reports.
    pub fn upsert(&self, service_name: &str, state: ServiceLivenessState) {
        let mut services = self.services.write().unwrap_or_else(|e| e.into_inner());
        services.insert(service_name.to_string(), state);
    }

    /// Records an accepted report received at `received_at`.
    pub fn record_report(
        &self,
        service_name: &str,
        received_at: DateTime<Utc>,
        latency_seconds: f64,
    ) -> ServiceLivenessState {
        let state = ServiceLivenessState {
            last_seen: Some(received_at),
            last_latency_seconds: Some(latency_seconds),
        };
        self.upsert(service_name, state);
        state
    }

    /// Copy of every known service, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, ServiceLivenessState> {
        let services = self.services.read().unwrap_or_else(|e| e.into_inner());
        services
            .iter()
            .map(|(name, state)| (name.clone(), *state))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
