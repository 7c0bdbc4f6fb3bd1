//! Capability handlers.
//!
//! One handler per capability, each binding the store (or the clock / RNG)
//! behind the fixed parameterized operation the registry exposes. Domain
//! outcomes - duplicate email, missing user, bad ttl - are decided here and
//! nowhere else; marshalling never reaches this layer and nothing here
//! touches guest memory.

pub mod db;
pub mod sys;

use std::sync::Arc;

use tessera_bridge_core::CapabilityId;
use tessera_host::{CapabilityRegistry, HostError};

use crate::store::Store;

/// Register every capability in the table. Fails fast on a duplicate, which
/// is fatal to daemon startup.
pub fn register_all(
    registry: &mut CapabilityRegistry,
    store: Arc<dyn Store>,
) -> Result<(), HostError> {
    registry.register(CapabilityId::SysGetTimestamp, sys::get_timestamp())?;
    registry.register(CapabilityId::SysRandomBytes, sys::random_bytes())?;

    registry.register(CapabilityId::DbCreateUser, db::create_user(store.clone()))?;
    registry.register(
        CapabilityId::DbGetUserByEmail,
        db::get_user_by_email(store.clone()),
    )?;
    registry.register(
        CapabilityId::DbGetUserByUuid,
        db::get_user_by_uuid(store.clone()),
    )?;
    registry.register(
        CapabilityId::DbGetUserCredentials,
        db::get_user_credentials(store.clone()),
    )?;
    registry.register(
        CapabilityId::DbUpdateUserPassword,
        db::update_user_password(store.clone()),
    )?;
    registry.register(
        CapabilityId::DbUpdateUserProfile,
        db::update_user_profile(store.clone()),
    )?;
    registry.register(
        CapabilityId::DbSetEmailVerified,
        db::set_email_verified(store.clone()),
    )?;

    registry.register(
        CapabilityId::DbCreateSession,
        db::create_session(store.clone()),
    )?;
    registry.register(CapabilityId::DbGetSession, db::get_session(store.clone()))?;
    registry.register(
        CapabilityId::DbDeleteSession,
        db::delete_session(store.clone()),
    )?;
    registry.register(
        CapabilityId::DbDeleteUserSessions,
        db::delete_user_sessions(store.clone()),
    )?;
    registry.register(
        CapabilityId::DbPurgeExpiredSessions,
        db::purge_expired_sessions(store.clone()),
    )?;

    registry.register(
        CapabilityId::DbCreateVerificationToken,
        db::create_verification_token(store.clone()),
    )?;
    registry.register(
        CapabilityId::DbConsumeVerificationToken,
        db::consume_verification_token(store.clone()),
    )?;
    registry.register(
        CapabilityId::DbCreateResetToken,
        db::create_reset_token(store.clone()),
    )?;
    registry.register(
        CapabilityId::DbConsumeResetToken,
        db::consume_reset_token(store.clone()),
    )?;

    registry.register(
        CapabilityId::DbCreateAuditLog,
        db::create_audit_log(store.clone()),
    )?;
    registry.register(
        CapabilityId::DbListAuditLogs,
        db::list_audit_logs(store.clone()),
    )?;
    registry.register(
        CapabilityId::DbQueryAuditLogs,
        db::query_audit_logs(store.clone()),
    )?;
    registry.register(CapabilityId::DbCountAuditLogs, db::count_audit_logs(store))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use tessera_bridge_core::ALL_CAPABILITIES;

    #[test]
    fn test_every_capability_gets_a_handler() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut registry = CapabilityRegistry::new();
        register_all(&mut registry, store).unwrap();

        assert_eq!(registry.len(), ALL_CAPABILITIES.len());
        for id in ALL_CAPABILITIES {
            assert!(registry.resolve(*id).is_some(), "missing handler for {id}");
        }
    }

    #[test]
    fn test_double_registration_is_fatal() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut registry = CapabilityRegistry::new();
        register_all(&mut registry, store.clone()).unwrap();
        assert!(register_all(&mut registry, store).is_err());
    }
}
