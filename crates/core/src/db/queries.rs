//! Typed query helpers for the dirauth tables.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::Database;
use crate::auth::roles::Role;
use crate::errors::DatabaseError;
use crate::models::{AuditEvent, IdentitySource, LocalAccount};

const ACCOUNT_COLUMNS: &str =
    "username, password_hash, role, full_name, email, enabled, created_at, updated_at";

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<LocalAccount> {
    let role: String = row.get(2)?;
    let role = role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;
    Ok(LocalAccount {
        username: row.get(0)?,
        password_hash: row.get(1)?,
        role,
        full_name: row.get(3)?,
        email: row.get(4)?,
        enabled: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn not_found(username: &str) -> DatabaseError {
    DatabaseError::NotFound {
        entity: "local account".into(),
        id: username.into(),
    }
}

impl Database {
    // -- local_accounts -----------------------------------------------------

    /// Insert a new local account. The password must already be hashed.
    pub fn insert_local_account(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
        full_name: &str,
        email: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO local_accounts
             (username, password_hash, role, full_name, email, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![username, password_hash, role.as_str(), full_name, email, now],
        );
        match result {
            Ok(_) => {
                debug!(username, role = %role, "inserted local account");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(DatabaseError::AlreadyExists {
                    entity: "local account".into(),
                    id: username.into(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a local account by username.
    pub fn get_local_account(&self, username: &str) -> Result<Option<LocalAccount>, DatabaseError> {
        let conn = self.conn();
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM local_accounts WHERE username = ?1"),
                params![username],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    /// List all local accounts ordered by username.
    pub fn list_local_accounts(&self) -> Result<Vec<LocalAccount>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM local_accounts ORDER BY username"
        ))?;
        let accounts = stmt
            .query_map([], row_to_account)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    /// Replace the stored password hash.
    pub fn update_local_password(&self, username: &str, password_hash: &str) -> Result<(), DatabaseError> {
        self.update_account_column(username, "password_hash", password_hash)
    }

    /// Change the role of a local account.
    pub fn update_local_role(&self, username: &str, role: Role) -> Result<(), DatabaseError> {
        self.update_account_column(username, "role", role.as_str())
    }

    /// Enable or disable a local account.
    pub fn set_local_account_enabled(&self, username: &str, enabled: bool) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE local_accounts SET enabled = ?1, updated_at = ?2 WHERE username = ?3",
            params![enabled, now, username],
        )?;
        if changed == 0 {
            return Err(not_found(username));
        }
        debug!(username, enabled, "updated local account status");
        Ok(())
    }

    /// Delete a local account.
    pub fn delete_local_account(&self, username: &str) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let changed = conn.execute(
            "DELETE FROM local_accounts WHERE username = ?1",
            params![username],
        )?;
        if changed == 0 {
            return Err(not_found(username));
        }
        debug!(username, "deleted local account");
        Ok(())
    }

    fn update_account_column(
        &self,
        username: &str,
        column: &'static str,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let changed = conn.execute(
            &format!("UPDATE local_accounts SET {column} = ?1, updated_at = ?2 WHERE username = ?3"),
            params![value, now, username],
        )?;
        if changed == 0 {
            return Err(not_found(username));
        }
        debug!(username, column, "updated local account");
        Ok(())
    }

    // -- auth_audit ---------------------------------------------------------

    /// Record one authentication attempt.
    pub fn insert_auth_event(
        &self,
        action: &str,
        username: &str,
        source: Option<IdentitySource>,
        success: bool,
        error_kind: Option<&str>,
        details: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO auth_audit (action, username, source, success, error_kind, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                action,
                username,
                source.map(IdentitySource::as_str),
                success,
                error_kind,
                details,
                now
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, action, username, success, "inserted auth_audit entry");
        Ok(id)
    }

    /// Most recent audit entries, newest first.
    pub fn list_auth_events(&self, limit: u32) -> Result<Vec<AuditEvent>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, action, username, source, success, error_kind, details, created_at
             FROM auth_audit ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(AuditEvent {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    username: row.get(2)?,
                    source: row.get(3)?,
                    success: row.get(4)?,
                    error_kind: row.get(5)?,
                    details: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_local_account_crud() {
        let db = setup_db();
        db.insert_local_account("ops", "$2b$04$hash", Role::Admin, "Ops Team", "ops@example.com")
            .unwrap();

        let account = db.get_local_account("ops").unwrap().unwrap();
        assert_eq!(account.role, Role::Admin);
        assert_eq!(account.full_name, "Ops Team");
        assert!(account.enabled);

        db.update_local_role("ops", Role::Superuser).unwrap();
        db.update_local_password("ops", "$2b$04$other").unwrap();
        db.set_local_account_enabled("ops", false).unwrap();
        let account = db.get_local_account("ops").unwrap().unwrap();
        assert_eq!(account.role, Role::Superuser);
        assert_eq!(account.password_hash, "$2b$04$other");
        assert!(!account.enabled);

        db.delete_local_account("ops").unwrap();
        assert!(db.get_local_account("ops").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_account_rejected() {
        let db = setup_db();
        db.insert_local_account("ops", "h", Role::User, "", "").unwrap();
        let result = db.insert_local_account("ops", "h", Role::User, "", "");
        assert!(matches!(result, Err(DatabaseError::AlreadyExists { .. })));
    }

    #[test]
    fn test_missing_account_updates_fail() {
        let db = setup_db();
        assert!(matches!(
            db.delete_local_account("ghost"),
            Err(DatabaseError::NotFound { .. })
        ));
        assert!(matches!(
            db.update_local_role("ghost", Role::User),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_accounts_sorted() {
        let db = setup_db();
        db.insert_local_account("zed", "h", Role::User, "", "").unwrap();
        db.insert_local_account("amy", "h", Role::Admin, "", "").unwrap();
        let names: Vec<String> = db
            .list_local_accounts()
            .unwrap()
            .into_iter()
            .map(|a| a.username)
            .collect();
        assert_eq!(names, vec!["amy", "zed"]);
    }

    #[test]
    fn test_auth_audit() {
        let db = setup_db();
        db.insert_auth_event("login", "jdoe", Some(IdentitySource::Directory), true, None, None)
            .unwrap();
        db.insert_auth_event(
            "login",
            "jdoe",
            None,
            false,
            Some("invalid_credentials"),
            Some("bad password"),
        )
        .unwrap();

        let events = db.list_auth_events(10).unwrap();
        assert_eq!(events.len(), 2);
        assert!(!events[0].success);
        assert_eq!(events[0].error_kind.as_deref(), Some("invalid_credentials"));
        assert_eq!(events[1].source.as_deref(), Some("directory"));
    }
}
