//! Origin-country access control for delivered events.
//!
//! Each subject has an [`AuthorizationRecord`] holding its registered origin
//! country and an access flag. The [`AccessValidator`] compares an event's
//! declared country with that origin: a mismatch revokes the subject, and a
//! revoked subject stays denied until an administrator reinstates it.
//! Subjects without a record pass through untouched.

mod db;
mod error;
mod store;
mod types;
mod validator;

pub use db::{
    get_authorization, insert_authorization_if_absent, reinstate_access, revoke_access,
    upsert_authorization,
};
pub use error::AccessError;
pub use store::{AuthorizationStore, SqliteAuthorizationStore};
pub use types::{AccessDecision, AuthorizationRecord, DenyReason, RevokeOutcome};
pub use validator::{countries_match, AccessValidator};
