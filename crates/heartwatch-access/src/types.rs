use serde::Serialize;

/// Access state of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationRecord {
    pub subject_id: i64,
    pub access_enabled: bool,
    /// Registered origin, stored upper-cased.
    pub origin_country: String,
    /// Set when access was last revoked, cleared on reinstatement.
    pub revoked_at: Option<String>,
    pub updated_at: String,
}

/// Result of a revoke attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// Access flipped from enabled to disabled.
    Revoked,
    /// Access was already disabled; nothing changed.
    AlreadyRevoked,
    UnknownSubject,
}

/// Why an event was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The subject was revoked before this event arrived.
    Revoked,
    /// The declared country differs from the registered origin. The subject
    /// has been revoked as a consequence.
    CountryMismatch {
        origin_country: String,
        declared_country: String,
    },
}

/// Outcome of validating one event.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessDecision {
    /// Known subject, matching origin, valid timestamp.
    AllowKnown { latency_seconds: f64 },
    /// No record exists for the subject. Nothing was checked or recorded.
    AllowUnknownSubject,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Deny(_))
    }
}
