use rusqlite::{params, Connection, OptionalExtension, Result};

use crate::types::{AuthorizationRecord, RevokeOutcome};

fn normalize_country(country: &str) -> String {
    country.trim().to_ascii_uppercase()
}

/// Retrieves the authorization record for a subject.
pub fn get_authorization(conn: &Connection, subject_id: i64) -> Result<Option<AuthorizationRecord>> {
    conn.query_row(
        "SELECT subject_id, access_enabled, origin_country, revoked_at, updated_at
         FROM authorizations
         WHERE subject_id = ?1",
        params![subject_id],
        |row| {
            Ok(AuthorizationRecord {
                subject_id: row.get(0)?,
                access_enabled: row.get(1)?,
                origin_country: row.get(2)?,
                revoked_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        },
    )
    .optional()
}

/// Disables access for a subject.
///
/// The flag only moves from enabled to disabled inside the `UPDATE`, so
/// concurrent revocations of the same subject resolve to exactly one
/// [`RevokeOutcome::Revoked`].
pub fn revoke_access(conn: &Connection, subject_id: i64) -> Result<RevokeOutcome> {
    let changed = conn.execute(
        "UPDATE authorizations
         SET access_enabled = 0, revoked_at = datetime('now'), updated_at = datetime('now')
         WHERE subject_id = ?1 AND access_enabled = 1",
        params![subject_id],
    )?;

    if changed > 0 {
        return Ok(RevokeOutcome::Revoked);
    }

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM authorizations WHERE subject_id = ?1)",
        params![subject_id],
        |row| row.get(0),
    )?;

    Ok(if exists {
        RevokeOutcome::AlreadyRevoked
    } else {
        RevokeOutcome::UnknownSubject
    })
}

/// Re-enables access for a subject. Returns `false` if no record exists.
pub fn reinstate_access(conn: &Connection, subject_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE authorizations
         SET access_enabled = 1, revoked_at = NULL, updated_at = datetime('now')
         WHERE subject_id = ?1",
        params![subject_id],
    )?;
    Ok(changed > 0)
}

/// Creates or replaces the record for a subject and returns it.
pub fn upsert_authorization(
    conn: &Connection,
    subject_id: i64,
    origin_country: &str,
    access_enabled: bool,
) -> Result<AuthorizationRecord> {
    conn.execute(
        "INSERT INTO authorizations (subject_id, access_enabled, origin_country, revoked_at, updated_at)
         VALUES (?1, ?2, ?3, CASE WHEN ?2 = 0 THEN datetime('now') END, datetime('now'))
         ON CONFLICT(subject_id) DO UPDATE SET
            access_enabled = excluded.access_enabled,
            origin_country = excluded.origin_country,
            revoked_at = CASE
                WHEN excluded.access_enabled = 1 THEN NULL
                WHEN authorizations.access_enabled = 0 THEN authorizations.revoked_at
                ELSE datetime('now')
            END,
            updated_at = datetime('now')",
        params![subject_id, access_enabled, normalize_country(origin_country)],
    )?;

    get_authorization(conn, subject_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Inserts a record unless one already exists. Returns `true` if inserted.
///
/// Used for startup seeding, so restarting never undoes a revocation.
pub fn insert_authorization_if_absent(
    conn: &Connection,
    subject_id: i64,
    origin_country: &str,
    access_enabled: bool,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO authorizations (subject_id, access_enabled, origin_country, revoked_at)
         VALUES (?1, ?2, ?3, CASE WHEN ?2 = 0 THEN datetime('now') END)",
        params![subject_id, access_enabled, normalize_country(origin_country)],
    )?;
    Ok(inserted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        heartwatch_db::run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn missing_subject_returns_none() {
        let conn = setup();
        assert!(get_authorization(&conn, 7).unwrap().is_none());
    }

    #[test]
    fn upsert_normalizes_country() {
        let conn = setup();
        let record = upsert_authorization(&conn, 42, " co ", true).unwrap();
        assert_eq!(record.origin_country, "CO");
        assert!(record.access_enabled);
        assert!(record.revoked_at.is_none());
    }

    #[test]
    fn revoke_twice_is_a_noop_the_second_time() {
        let conn = setup();
        upsert_authorization(&conn, 42, "CO", true).unwrap();

        assert_eq!(revoke_access(&conn, 42).unwrap(), RevokeOutcome::Revoked);
        let first = get_authorization(&conn, 42).unwrap().unwrap();

        assert_eq!(
            revoke_access(&conn, 42).unwrap(),
            RevokeOutcome::AlreadyRevoked
        );
        let second = get_authorization(&conn, 42).unwrap().unwrap();

        assert!(!second.access_enabled);
        assert_eq!(first.revoked_at, second.revoked_at);
    }

    #[test]
    fn revoke_unknown_subject() {
        let conn = setup();
        assert_eq!(
            revoke_access(&conn, 99).unwrap(),
            RevokeOutcome::UnknownSubject
        );
        assert!(get_authorization(&conn, 99).unwrap().is_none());
    }

    #[test]
    fn reinstate_clears_revocation() {
        let conn = setup();
        upsert_authorization(&conn, 42, "CO", true).unwrap();
        revoke_access(&conn, 42).unwrap();

        assert!(reinstate_access(&conn, 42).unwrap());
        let record = get_authorization(&conn, 42).unwrap().unwrap();
        assert!(record.access_enabled);
        assert!(record.revoked_at.is_none());

        assert!(!reinstate_access(&conn, 1_000).unwrap());
    }

    #[test]
    fn seeding_never_overwrites_existing_record() {
        let conn = setup();
        assert!(insert_authorization_if_absent(&conn, 42, "CO", true).unwrap());
        revoke_access(&conn, 42).unwrap();

        assert!(!insert_authorization_if_absent(&conn, 42, "CO", true).unwrap());
        let record = get_authorization(&conn, 42).unwrap().unwrap();
        assert!(!record.access_enabled, "seed must not undo a revocation");
    }

    #[test]
    fn upsert_disabled_records_revocation_time() {
        let conn = setup();
        let record = upsert_authorization(&conn, 5, "PE", false).unwrap();
        assert!(!record.access_enabled);
        assert!(record.revoked_at.is_some());

        let record = upsert_authorization(&conn, 5, "PE", true).unwrap();
        assert!(record.revoked_at.is_none());
    }
}
