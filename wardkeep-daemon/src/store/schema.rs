//! Record types the store returns.
//!
//! These are the shapes that cross the bridge as capability `data`, so they
//! derive `Serialize`. `UserRecord` deliberately has no `password_hash`
//! field: credentials only leave the store through the dedicated
//! credentials lookup.

use serde::{Deserialize, Serialize};

/// A user row, minus credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Identity of a freshly created user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub id: i64,
    pub uuid: String,
}

/// Login credentials for a password check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCredentials {
    pub uuid: String,
    pub password_hash: String,
}

/// A session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_uuid: String,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Single-use token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Verification,
    Reset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Verification => "verification",
            TokenKind::Reset => "reset",
        }
    }
}

/// A freshly minted single-use token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintedToken {
    pub token: String,
    pub expires_at: i64,
}

/// An audit log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub user_uuid: String,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub metadata: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
}

/// Fields for a new audit entry.
#[derive(Debug, Clone, Default)]
pub struct NewAuditLog {
    pub user_uuid: String,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub metadata: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Filters for the cross-user audit query.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub user_uuid: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}
