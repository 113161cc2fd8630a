use heartwatch_db::DbPool;

use crate::db;
use crate::error::AccessError;
use crate::types::{AuthorizationRecord, RevokeOutcome};

/// Persistence seam for authorization records.
///
/// Implementations are blocking; async callers run them on the blocking
/// pool.
pub trait AuthorizationStore: Send + Sync {
    fn find(&self, subject_id: i64) -> Result<Option<AuthorizationRecord>, AccessError>;

    /// Atomically disables access. Idempotent.
    fn revoke(&self, subject_id: i64) -> Result<RevokeOutcome, AccessError>;

    fn reinstate(&self, subject_id: i64) -> Result<bool, AccessError>;

    fn upsert(
        &self,
        subject_id: i64,
        origin_country: &str,
        access_enabled: bool,
    ) -> Result<AuthorizationRecord, AccessError>;

    fn insert_if_absent(
        &self,
        subject_id: i64,
        origin_country: &str,
        access_enabled: bool,
    ) -> Result<bool, AccessError>;
}

/// [`AuthorizationStore`] over the pooled SQLite database.
#[derive(Clone)]
pub struct SqliteAuthorizationStore {
    pool: DbPool,
}

impl SqliteAuthorizationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl AuthorizationStore for SqliteAuthorizationStore {
    fn find(&self, subject_id: i64) -> Result<Option<AuthorizationRecord>, AccessError> {
        let conn = self.pool.get()?;
        Ok(db::get_authorization(&conn, subject_id)?)
    }

    fn revoke(&self, subject_id: i64) -> Result<RevokeOutcome, AccessError> {
        let conn = self.pool.get()?;
        Ok(db::revoke_access(&conn, subject_id)?)
    }

    fn reinstate(&self, subject_id: i64) -> Result<bool, AccessError> {
        let conn = self.pool.get()?;
        Ok(db::reinstate_access(&conn, subject_id)?)
    }

    fn upsert(
        &self,
        subject_id: i64,
        origin_country: &str,
        access_enabled: bool,
    ) -> Result<AuthorizationRecord, AccessError> {
        let conn = self.pool.get()?;
        Ok(db::upsert_authorization(
            &conn,
            subject_id,
            origin_country,
            access_enabled,
        )?)
    }

    fn insert_if_absent(
        &self,
        subject_id: i64,
        origin_country: &str,
        access_enabled: bool,
    ) -> Result<bool, AccessError> {
        let conn = self.pool.get()?;
        Ok(db::insert_authorization_if_absent(
            &conn,
            subject_id,
            origin_country,
            access_enabled,
        )?)
    }
}
