//! SQLite-backed store for users, sessions, tokens and audit logs.
//!
//! The store is the one shared mutable resource behind the bridge: plugins
//! never see the connection, only the fixed parameterized operations that
//! capability handlers expose. The connection sits behind a `Mutex`, held
//! only for the duration of one operation and never across a boundary
//! crossing. Every multi-statement operation runs in a transaction so a
//! watchdog timeout cannot leave half-applied state.
//!
//! The database lives at `$XDG_DATA_HOME/wardkeep/wardkeep.db`.

pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub use schema::{
    AuditQuery, AuditRecord, MintedToken, NewAuditLog, NewUser, SessionRecord, TokenKind,
    UserCredentials, UserRecord,
};

/// Failures a store operation can produce.
#[derive(Error, Debug)]
pub enum StoreError {
    /// UNIQUE constraint on `users.email`; the constraint is the source of
    /// truth for duplicates, not any pre-check.
    #[error("email already exists")]
    EmailTaken,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// The persistent operations capability handlers are built from.
pub trait Store: Send + Sync {
    fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        now: i64,
    ) -> Result<NewUser, StoreError>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
    fn get_user_by_uuid(&self, uuid: &str) -> Result<Option<UserRecord>, StoreError>;
    fn get_user_credentials(&self, email: &str) -> Result<Option<UserCredentials>, StoreError>;
    fn update_user_password(
        &self,
        uuid: &str,
        password_hash: &str,
        now: i64,
    ) -> Result<bool, StoreError>;
    fn update_user_profile(
        &self,
        uuid: &str,
        name: Option<&str>,
        bio: Option<&str>,
        avatar: Option<&str>,
        now: i64,
    ) -> Result<bool, StoreError>;
    fn set_email_verified(&self, uuid: &str, verified: bool, now: i64)
        -> Result<bool, StoreError>;

    fn create_session(
        &self,
        user_uuid: &str,
        ttl_seconds: u64,
        now: i64,
    ) -> Result<Option<SessionRecord>, StoreError>;
    fn get_session(&self, session_id: &str, now: i64)
        -> Result<Option<SessionRecord>, StoreError>;
    fn delete_session(&self, session_id: &str) -> Result<bool, StoreError>;
    fn delete_user_sessions(&self, user_uuid: &str) -> Result<u64, StoreError>;
    fn purge_expired_sessions(&self, now: i64) -> Result<u64, StoreError>;

    fn create_token(
        &self,
        kind: TokenKind,
        user_uuid: &str,
        ttl_seconds: u64,
        now: i64,
    ) -> Result<Option<MintedToken>, StoreError>;
    fn consume_token(
        &self,
        kind: TokenKind,
        token: &str,
        now: i64,
    ) -> Result<Option<String>, StoreError>;

    fn create_audit_log(&self, entry: &NewAuditLog, now: i64) -> Result<i64, StoreError>;
    fn list_audit_logs(
        &self,
        user_uuid: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditRecord>, StoreError>;
    fn query_audit_logs(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError>;
    fn count_audit_logs(&self, user_uuid: &str) -> Result<i64, StoreError>;
}

/// SQLite-backed implementation of [`Store`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the store at the default XDG path, creating it if needed.
    pub fn open() -> Result<Self> {
        let db_path = Self::default_db_path()?;
        Self::open_at(&db_path)
    }

    /// Open the store at a specific path. Useful for tests with temporary
    /// databases.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory: {parent:?}"))?;
        }

        info!("Opening store database at: {:?}", path);

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path:?}"))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store. Tests only need this, but keeping it here
    /// means they exercise the same migration path.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])
            .context("failed to enable foreign keys")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        {
            let mut conn = store.conn.lock().unwrap();
            migrations::run(&mut conn)?;
        }
        Ok(store)
    }

    /// Default database path under XDG data.
    fn default_db_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "raibid-labs", "wardkeep")
            .context("failed to determine project directories")?;
        Ok(project_dirs.data_dir().join("wardkeep.db"))
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<UserRecord> {
        Ok(UserRecord {
            id: row.get(0)?,
            uuid: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            email_verified: row.get::<_, i64>(4)? != 0,
            bio: row.get(5)?,
            avatar: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn row_to_audit(row: &rusqlite::Row) -> rusqlite::Result<AuditRecord> {
        Ok(AuditRecord {
            id: row.get(0)?,
            user_uuid: row.get(1)?,
            action: row.get(2)?,
            resource_type: row.get(3)?,
            resource_id: row.get(4)?,
            metadata: row.get(5)?,
            ip_address: row.get(6)?,
            user_agent: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

const USER_COLUMNS: &str =
    "id, uuid, name, email, email_verified, bio, avatar, created_at, updated_at";

const AUDIT_COLUMNS: &str = "id, user_uuid, action, resource_type, resource_id, metadata, \
                             ip_address, user_agent, created_at";

impl Store for SqliteStore {
    fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        now: i64,
    ) -> Result<NewUser, StoreError> {
        let conn = self.conn.lock().unwrap();
        let uuid = Uuid::new_v4().to_string();

        let result = conn.execute(
            "INSERT INTO users (uuid, name, email, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![uuid, name, email, password_hash, now],
        );

        match result {
            Ok(_) => Ok(NewUser {
                id: conn.last_insert_rowid(),
                uuid,
            }),
            Err(rusqlite::Error::SqliteFailure(e, Some(msg)))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && msg.contains("users.email") =>
            {
                Err(StoreError::EmailTaken)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn get_user_by_uuid(&self, uuid: &str) -> Result<Option<UserRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE uuid = ?1"),
                params![uuid],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn get_user_credentials(&self, email: &str) -> Result<Option<UserCredentials>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let creds = conn
            .query_row(
                "SELECT uuid, password_hash FROM users WHERE email = ?1",
                params![email],
                |row| {
                    Ok(UserCredentials {
                        uuid: row.get(0)?,
                        password_hash: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(creds)
    }

    fn update_user_password(
        &self,
        uuid: &str,
        password_hash: &str,
        now: i64,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE uuid = ?1",
            params![uuid, password_hash, now],
        )?;
        Ok(rows > 0)
    }

    fn update_user_profile(
        &self,
        uuid: &str,
        name: Option<&str>,
        bio: Option<&str>,
        avatar: Option<&str>,
        now: i64,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE users SET name = COALESCE(?2, name),
                              bio = COALESCE(?3, bio),
                              avatar = COALESCE(?4, avatar),
                              updated_at = ?5
             WHERE uuid = ?1",
            params![uuid, name, bio, avatar, now],
        )?;
        Ok(rows > 0)
    }

    fn set_email_verified(
        &self,
        uuid: &str,
        verified: bool,
        now: i64,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE users SET email_verified = ?2, updated_at = ?3 WHERE uuid = ?1",
            params![uuid, verified as i64, now],
        )?;
        Ok(rows > 0)
    }

    fn create_session(
        &self,
        user_uuid: &str,
        ttl_seconds: u64,
        now: i64,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let user_exists: bool = conn
            .query_row(
                "SELECT 1 FROM users WHERE uuid = ?1",
                params![user_uuid],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !user_exists {
            return Ok(None);
        }

        let session_id = Uuid::new_v4().to_string();
        let expires_at = now + ttl_seconds as i64;
        conn.execute(
            "INSERT INTO sessions (id, user_uuid, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, user_uuid, now, expires_at],
        )?;

        Ok(Some(SessionRecord {
            session_id,
            user_uuid: user_uuid.to_string(),
            created_at: now,
            expires_at,
        }))
    }

    fn get_session(
        &self,
        session_id: &str,
        now: i64,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        // Expired rows read as absent; reclamation is purge's job.
        let session = conn
            .query_row(
                "SELECT id, user_uuid, created_at, expires_at FROM sessions
                 WHERE id = ?1 AND expires_at > ?2",
                params![session_id, now],
                |row| {
                    Ok(SessionRecord {
                        session_id: row.get(0)?,
                        user_uuid: row.get(1)?,
                        created_at: row.get(2)?,
                        expires_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(rows > 0)
    }

    fn delete_user_sessions(&self, user_uuid: &str) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "DELETE FROM sessions WHERE user_uuid = ?1",
            params![user_uuid],
        )?;
        Ok(rows as u64)
    }

    fn purge_expired_sessions(&self, now: i64) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![now],
        )?;
        Ok(rows as u64)
    }

    fn create_token(
        &self,
        kind: TokenKind,
        user_uuid: &str,
        ttl_seconds: u64,
        now: i64,
    ) -> Result<Option<MintedToken>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let user_exists: bool = conn
            .query_row(
                "SELECT 1 FROM users WHERE uuid = ?1",
                params![user_uuid],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !user_exists {
            return Ok(None);
        }

        let token = Uuid::new_v4().to_string();
        let expires_at = now + ttl_seconds as i64;
        conn.execute(
            "INSERT INTO tokens (token, kind, user_uuid, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![token, kind.as_str(), user_uuid, now, expires_at],
        )?;

        Ok(Some(MintedToken { token, expires_at }))
    }

    fn consume_token(
        &self,
        kind: TokenKind,
        token: &str,
        now: i64,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let row: Option<(String, i64)> = tx
            .query_row(
                "SELECT user_uuid, expires_at FROM tokens WHERE token = ?1 AND kind = ?2",
                params![token, kind.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let consumed = match row {
            None => None,
            Some((user_uuid, expires_at)) => {
                // A seen token is gone either way; only a live one redeems.
                tx.execute("DELETE FROM tokens WHERE token = ?1", params![token])?;
                if expires_at <= now {
                    None
                } else {
                    if kind == TokenKind::Reset {
                        // Redeeming one reset token invalidates the rest.
                        tx.execute(
                            "DELETE FROM tokens WHERE user_uuid = ?1 AND kind = ?2",
                            params![user_uuid, kind.as_str()],
                        )?;
                    }
                    Some(user_uuid)
                }
            }
        };

        tx.commit()?;
        Ok(consumed)
    }

    fn create_audit_log(&self, entry: &NewAuditLog, now: i64) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO audit_logs (user_uuid, action, resource_type, resource_id,
                                     metadata, ip_address, user_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.user_uuid,
                entry.action,
                entry.resource_type,
                entry.resource_id,
                entry.metadata,
                entry.ip_address,
                entry.user_agent,
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_audit_logs(
        &self,
        user_uuid: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs
             WHERE user_uuid = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let records = stmt
            .query_map(params![user_uuid, limit, offset], Self::row_to_audit)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn query_audit_logs(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();

        // Build the query dynamically based on filters
        let mut sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(user_uuid) = &query.user_uuid {
            sql.push_str(" AND user_uuid = ?");
            params_vec.push(Box::new(user_uuid.clone()));
        }
        if let Some(action) = &query.action {
            sql.push_str(" AND action = ?");
            params_vec.push(Box::new(action.clone()));
        }
        if let Some(resource_type) = &query.resource_type {
            sql.push_str(" AND resource_type = ?");
            params_vec.push(Box::new(resource_type.clone()));
        }
        if let Some(start_time) = query.start_time {
            sql.push_str(" AND created_at >= ?");
            params_vec.push(Box::new(start_time));
        }
        if let Some(end_time) = query.end_time {
            sql.push_str(" AND created_at <= ?");
            params_vec.push(Box::new(end_time));
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
        params_vec.push(Box::new(query.limit));
        params_vec.push(Box::new(query.offset));

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec
            .iter()
            .map(|p| p.as_ref() as &dyn rusqlite::ToSql)
            .collect();

        let records = stmt
            .query_map(params_refs.as_slice(), Self::row_to_audit)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn count_audit_logs(&self, user_uuid: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM audit_logs WHERE user_uuid = ?1",
            params![user_uuid],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
