use chrono::{DateTime, FixedOffset, Utc};
use heartwatch_types::{latency_seconds, ReportError};
use std::sync::Arc;

use crate::error::AccessError;
use crate::store::AuthorizationStore;
use crate::types::{AccessDecision, DenyReason, RevokeOutcome};

/// Compares two country codes, ignoring case and surrounding whitespace.
pub fn countries_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Applies the origin-country rule to delivered events.
#[derive(Clone)]
pub struct AccessValidator {
    store: Arc<dyn AuthorizationStore>,
}

impl AccessValidator {
    pub fn new(store: Arc<dyn AuthorizationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn AuthorizationStore> {
        &self.store
    }

    /// Decides whether an event may proceed.
    ///
    /// `timestamp` is the result of parsing the event's timestamp. It is only
    /// inspected once the subject is known, enabled and matching; a
    /// timestamp error there is returned as [`AccessError::Report`].
    ///
    /// A country mismatch revokes the subject before returning
    /// [`AccessDecision::Deny`].
    pub fn validate(
        &self,
        subject_id: i64,
        declared_country: &str,
        timestamp: Result<DateTime<FixedOffset>, ReportError>,
        received_at: DateTime<Utc>,
    ) -> Result<AccessDecision, AccessError> {
        let Some(record) = self.store.find(subject_id)? else {
            tracing::debug!(subject_id, "no authorization record, passing event through");
            return Ok(AccessDecision::AllowUnknownSubject);
        };

        if !record.access_enabled {
            tracing::warn!(
                subject_id,
                declared_country,
                "event denied: access previously revoked"
            );
            return Ok(AccessDecision::Deny(DenyReason::Revoked));
        }

        if !countries_match(declared_country, &record.origin_country) {
            let outcome = self.store.revoke(subject_id)?;
            tracing::warn!(
                subject_id,
                declared_country,
                origin_country = %record.origin_country,
                newly_revoked = outcome == RevokeOutcome::Revoked,
                "event denied: declared country does not match origin, access revoked"
            );
            return Ok(AccessDecision::Deny(DenyReason::CountryMismatch {
                origin_country: record.origin_country,
                declared_country: declared_country.trim().to_string(),
            }));
        }

        let sent_at = timestamp?;
        Ok(AccessDecision::AllowKnown {
            latency_seconds: latency_seconds(received_at, sent_at),
        })
    }
}
