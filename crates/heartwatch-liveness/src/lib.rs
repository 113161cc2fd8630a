//! Per-service liveness state and the sweep that turns it into alerts.
//!
//! The [`LivenessRegistry`] is written by the heartbeat aggregator on every
//! accepted report and read by the [`Sweeper`] and status queries. A sweep
//! classifies each watched service as [`LivenessClass::Ok`],
//! [`LivenessClass::TimedOut`] or [`LivenessClass::NeverSeen`] and hands one
//! [`AlertEvent`](heartwatch_types::AlertEvent) per non-OK service to every
//! configured [`AlertSink`]. Alerts are level-triggered: a service that stays
//! silent is reported again on every sweep.

mod alerts;
mod registry;
mod sweep;

pub use alerts::{AlertSink, BroadcastAlertSink, TracingAlertSink};
pub use registry::{LivenessRegistry, ServiceLivenessState};
pub use sweep::{classify, sweep, LivenessClass, ServiceStatus, SweepReport, Sweeper};
