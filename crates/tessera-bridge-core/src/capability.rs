//! The capability table.
//!
//! Every operation the host exposes to sandboxed code is one variant of
//! [`CapabilityId`]. The table is closed: a name that does not parse is a
//! contract violation surfaced to the caller, and a typo in a handler
//! registration fails at host startup rather than at first call.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// A host operation a sandboxed guest may invoke.
///
/// Names follow the `<domain>_<verb>_<noun>` convention on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityId {
    /// Current Unix timestamp in seconds.
    SysGetTimestamp,

    /// Host-sourced random bytes (sandboxed code has no entropy).
    SysRandomBytes,

    /// Create a user account.
    DbCreateUser,

    /// Fetch a user by email, without credentials.
    DbGetUserByEmail,

    /// Fetch a user by uuid, without credentials.
    DbGetUserByUuid,

    /// Fetch `{uuid, password_hash}` for a login check.
    DbGetUserCredentials,

    /// Replace a user's password hash.
    DbUpdateUserPassword,

    /// Update name/bio/avatar.
    DbUpdateUserProfile,

    /// Mark an email address verified or unverified.
    DbSetEmailVerified,

    /// Open a session for a user.
    DbCreateSession,

    /// Look up a live session; absence is a valid result.
    DbGetSession,

    /// Delete one session.
    DbDeleteSession,

    /// Delete every session belonging to a user.
    DbDeleteUserSessions,

    /// Reclaim expired session rows.
    DbPurgeExpiredSessions,

    /// Mint an email-verification token.
    DbCreateVerificationToken,

    /// Redeem (and delete) an email-verification token.
    DbConsumeVerificationToken,

    /// Mint a password-reset token.
    DbCreateResetToken,

    /// Redeem a password-reset token; deletes all of the user's reset tokens.
    DbConsumeResetToken,

    /// Append an audit log entry.
    DbCreateAuditLog,

    /// List a user's audit entries, newest first.
    DbListAuditLogs,

    /// Filtered audit query across users.
    DbQueryAuditLogs,

    /// Count a user's audit entries.
    DbCountAuditLogs,
}

/// All capabilities, in wire-name order. Used to build the full registry and
/// to grant everything in tests.
pub const ALL_CAPABILITIES: &[CapabilityId] = &[
    CapabilityId::SysGetTimestamp,
    CapabilityId::SysRandomBytes,
    CapabilityId::DbCreateUser,
    CapabilityId::DbGetUserByEmail,
    CapabilityId::DbGetUserByUuid,
    CapabilityId::DbGetUserCredentials,
    CapabilityId::DbUpdateUserPassword,
    CapabilityId::DbUpdateUserProfile,
    CapabilityId::DbSetEmailVerified,
    CapabilityId::DbCreateSession,
    CapabilityId::DbGetSession,
    CapabilityId::DbDeleteSession,
    CapabilityId::DbDeleteUserSessions,
    CapabilityId::DbPurgeExpiredSessions,
    CapabilityId::DbCreateVerificationToken,
    CapabilityId::DbConsumeVerificationToken,
    CapabilityId::DbCreateResetToken,
    CapabilityId::DbConsumeResetToken,
    CapabilityId::DbCreateAuditLog,
    CapabilityId::DbListAuditLogs,
    CapabilityId::DbQueryAuditLogs,
    CapabilityId::DbCountAuditLogs,
];

impl CapabilityId {
    /// Parse a wire name. Unknown names are not representable.
    pub fn parse(s: &str) -> Option<Self> {
        let id = match s {
            "sys_get_timestamp" => CapabilityId::SysGetTimestamp,
            "sys_random_bytes" => CapabilityId::SysRandomBytes,
            "db_create_user" => CapabilityId::DbCreateUser,
            "db_get_user_by_email" => CapabilityId::DbGetUserByEmail,
            "db_get_user_by_uuid" => CapabilityId::DbGetUserByUuid,
            "db_get_user_credentials" => CapabilityId::DbGetUserCredentials,
            "db_update_user_password" => CapabilityId::DbUpdateUserPassword,
            "db_update_user_profile" => CapabilityId::DbUpdateUserProfile,
            "db_set_email_verified" => CapabilityId::DbSetEmailVerified,
            "db_create_session" => CapabilityId::DbCreateSession,
            "db_get_session" => CapabilityId::DbGetSession,
            "db_delete_session" => CapabilityId::DbDeleteSession,
            "db_delete_user_sessions" => CapabilityId::DbDeleteUserSessions,
            "db_purge_expired_sessions" => CapabilityId::DbPurgeExpiredSessions,
            "db_create_verification_token" => CapabilityId::DbCreateVerificationToken,
            "db_consume_verification_token" => CapabilityId::DbConsumeVerificationToken,
            "db_create_reset_token" => CapabilityId::DbCreateResetToken,
            "db_consume_reset_token" => CapabilityId::DbConsumeResetToken,
            "db_create_audit_log" => CapabilityId::DbCreateAuditLog,
            "db_list_audit_logs" => CapabilityId::DbListAuditLogs,
            "db_query_audit_logs" => CapabilityId::DbQueryAuditLogs,
            "db_count_audit_logs" => CapabilityId::DbCountAuditLogs,
            _ => return None,
        };
        Some(id)
    }

    /// The wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityId::SysGetTimestamp => "sys_get_timestamp",
            CapabilityId::SysRandomBytes => "sys_random_bytes",
            CapabilityId::DbCreateUser => "db_create_user",
            CapabilityId::DbGetUserByEmail => "db_get_user_by_email",
            CapabilityId::DbGetUserByUuid => "db_get_user_by_uuid",
            CapabilityId::DbGetUserCredentials => "db_get_user_credentials",
            CapabilityId::DbUpdateUserPassword => "db_update_user_password",
            CapabilityId::DbUpdateUserProfile => "db_update_user_profile",
            CapabilityId::DbSetEmailVerified => "db_set_email_verified",
            CapabilityId::DbCreateSession => "db_create_session",
            CapabilityId::DbGetSession => "db_get_session",
            CapabilityId::DbDeleteSession => "db_delete_session",
            CapabilityId::DbDeleteUserSessions => "db_delete_user_sessions",
            CapabilityId::DbPurgeExpiredSessions => "db_purge_expired_sessions",
            CapabilityId::DbCreateVerificationToken => "db_create_verification_token",
            CapabilityId::DbConsumeVerificationToken => "db_consume_verification_token",
            CapabilityId::DbCreateResetToken => "db_create_reset_token",
            CapabilityId::DbConsumeResetToken => "db_consume_reset_token",
            CapabilityId::DbCreateAuditLog => "db_create_audit_log",
            CapabilityId::DbListAuditLogs => "db_list_audit_logs",
            CapabilityId::DbQueryAuditLogs => "db_query_audit_logs",
            CapabilityId::DbCountAuditLogs => "db_count_audit_logs",
        }
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A manifest named a capability that does not exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown capability: {0}")]
pub struct UnknownCapability(pub String);

/// The set of capabilities granted to one plugin.
///
/// Built from the manifest's `capabilities = [...]` list; checked by the
/// dispatcher before resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityGrants {
    grants: HashSet<CapabilityId>,
}

impl CapabilityGrants {
    /// Empty grant set (everything denied).
    pub fn none() -> Self {
        Self::default()
    }

    /// Grant set covering the whole capability table.
    pub fn all() -> Self {
        ALL_CAPABILITIES.iter().copied().collect()
    }

    /// Parse grant names from a manifest. Fails on the first unknown name so
    /// typos surface at load time, not at first call.
    pub fn from_strings<I, S>(strings: I) -> Result<Self, UnknownCapability>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut grants = HashSet::new();
        for s in strings {
            let s = s.as_ref();
            let id = CapabilityId::parse(s).ok_or_else(|| UnknownCapability(s.to_string()))?;
            grants.insert(id);
        }
        Ok(Self { grants })
    }

    /// Add a grant.
    pub fn add(&mut self, id: CapabilityId) {
        self.grants.insert(id);
    }

    /// Check whether a capability is granted.
    pub fn allows(&self, id: CapabilityId) -> bool {
        self.grants.contains(&id)
    }

    /// Iterate the granted capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &CapabilityId> {
        self.grants.iter()
    }

    /// Number of grants.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// True if nothing is granted.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

impl FromIterator<CapabilityId> for CapabilityGrants {
    fn from_iter<T: IntoIterator<Item = CapabilityId>>(iter: T) -> Self {
        Self {
            grants: iter.into_iter().collect(),
        }
    }
}
