//! Integration tests for the capability bridge.
//!
//! These tests drive the real stack end to end: sandboxed plugin modules
//! (auth, audit) calling through the dispatcher into the full capability
//! table over an in-memory SQLite store. Envelope-shape assertions use a
//! raw caller with every grant; enforcement tests use a deliberately
//! under-granted module.

mod fixtures;

use chrono::Utc;
use fixtures::{test_bridge, RawCaller};
use serde_json::json;
use std::sync::Arc;

use plugin_audit::{ActivityPage, AuditPlugin};
use plugin_auth::{AuthPlugin, CheckSessionResponse, LoginResponse, SignupResponse};
use tessera_bridge_core::{CapabilityGrants, Envelope, ErrorKind, MemoryHandle};
use tessera_guest::{BridgeClient, GuestError, GuestModule};
use tessera_host::Dispatcher;
use tessera_sandbox::{marshal, LinearMemory};
use wardkeep_daemon::plugin::PluginManager;
use wardkeep_daemon::store::Store;

// ============================================================================
// Envelope-level scenarios
// ============================================================================

#[test]
fn test_create_user_then_duplicate() {
    let (dispatcher, _store) = test_bridge();
    let mut caller = RawCaller::new(dispatcher);

    let env = caller.call(
        "db_create_user",
        json!({"name": "alice", "email": "a@x.com", "password_hash": "h1"}),
    );
    assert!(env.success);
    let data = env.data.unwrap();
    assert_eq!(data["id"], 1);
    assert!(data["uuid"].as_str().unwrap().len() >= 32);

    // The identical call again: a domain failure, not a bridge failure.
    let env = caller.call(
        "db_create_user",
        json!({"name": "alice", "email": "a@x.com", "password_hash": "h1"}),
    );
    assert!(!env.success);
    let err = env.error.unwrap();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(err.message, "email already exists");
}

#[test]
fn test_get_session_miss_is_stable_null() {
    let (dispatcher, _store) = test_bridge();
    let mut caller = RawCaller::new(dispatcher);

    for _ in 0..2 {
        let env = caller.call("db_get_session", json!({"session_id": "nonexistent"}));
        assert!(env.success);
        assert_eq!(env.data, Some(serde_json::Value::Null));
    }
}

#[test]
fn test_unknown_capability_is_not_found() {
    let (dispatcher, _store) = test_bridge();
    let mut caller = RawCaller::new(dispatcher);

    let env = caller.call("db_drop_all_tables", json!({}));
    assert!(!env.success);
    assert_eq!(env.error.unwrap().kind, ErrorKind::CapabilityNotFound);
}

#[test]
fn test_forged_request_handle_creates_nothing() {
    let (dispatcher, store) = test_bridge();

    // A request handle claiming 4 GiB against a 1-page guest memory.
    let mut mem = LinearMemory::new(1, 1);
    let name = marshal::write_buffer(&mut mem, b"db_create_user").unwrap();
    let forged = MemoryHandle::new(0, u32::MAX);
    let raw = dispatcher.dispatch(
        &mut mem,
        &CapabilityGrants::all(),
        "test-harness",
        name,
        forged,
    );

    let env = Envelope::from_bytes(&mem.read(MemoryHandle::unpack(raw)).unwrap()).unwrap();
    assert_eq!(env.error.unwrap().kind, ErrorKind::OutOfBounds);

    // No handler ran: the table is still empty.
    assert!(store.get_user_by_email("a@x.com").unwrap().is_none());
}

// ============================================================================
// Concurrency properties
// ============================================================================

#[test]
fn test_concurrent_distinct_emails_all_succeed() {
    const N: usize = 8;
    let (dispatcher, store) = test_bridge();

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            std::thread::spawn(move || {
                let mut caller = RawCaller::new(dispatcher);
                let env = caller.call(
                    "db_create_user",
                    json!({
                        "name": format!("user{i}"),
                        "email": format!("user{i}@x.com"),
                        "password_hash": "h",
                    }),
                );
                assert!(env.success);
                env.data.unwrap()["id"].as_i64().unwrap()
            })
        })
        .collect();

    let mut ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort_unstable();
    // Exactly N rows, distinct ids.
    assert_eq!(ids, (1..=N as i64).collect::<Vec<_>>());
    for i in 0..N {
        assert!(store
            .get_user_by_email(&format!("user{i}@x.com"))
            .unwrap()
            .is_some());
    }
}

#[test]
fn test_concurrent_same_email_single_winner() {
    const N: usize = 8;
    let (dispatcher, _store) = test_bridge();

    let handles: Vec<_> = (0..N)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            std::thread::spawn(move || {
                let mut caller = RawCaller::new(dispatcher);
                let env = caller.call(
                    "db_create_user",
                    json!({"name": "race", "email": "race@x.com", "password_hash": "h"}),
                );
                if env.success {
                    Ok(())
                } else {
                    let err = env.error.unwrap();
                    assert_eq!(err.kind, ErrorKind::Conflict);
                    Err(())
                }
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(winners, 1);
    assert_eq!(outcomes.len() - winners, N - 1);
}

// ============================================================================
// Full plugin flows
// ============================================================================

fn manager_with_plugins(dispatcher: Arc<Dispatcher>) -> PluginManager {
    let mut manager = PluginManager::new(dispatcher, 16);
    manager.install(Box::new(AuthPlugin::new())).unwrap();
    manager.install(Box::new(AuditPlugin::new())).unwrap();
    manager
}

fn call_entry<T: serde::de::DeserializeOwned>(
    manager: &mut PluginManager,
    plugin: &str,
    entry: &str,
    payload: serde_json::Value,
) -> T {
    let out = manager
        .call(plugin, entry, &serde_json::to_vec(&payload).unwrap())
        .unwrap();
    serde_json::from_slice(&out).unwrap()
}

#[test]
fn test_signup_login_session_logout_flow() {
    let (dispatcher, _store) = test_bridge();
    let mut manager = manager_with_plugins(dispatcher);

    let signup: SignupResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "signup",
        json!({"name": "Alice", "email": "alice@x.com", "password": "correct horse"}),
    );
    assert!(signup.success, "{}", signup.message);
    let user_uuid = signup.user_uuid.unwrap();

    // Wrong password first.
    let bad: LoginResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "login",
        json!({"email": "alice@x.com", "password": "wrong horse"}),
    );
    assert!(!bad.success);
    assert!(bad.session_id.is_none());

    let login: LoginResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "login",
        json!({"email": "alice@x.com", "password": "correct horse"}),
    );
    assert!(login.success, "{}", login.message);
    let session_id = login.session_id.unwrap();

    let check: CheckSessionResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "check_session",
        json!({"session_id": session_id}),
    );
    assert!(check.valid);
    assert_eq!(check.user_uuid.as_deref(), Some(user_uuid.as_str()));

    let _: serde_json::Value = call_entry(
        &mut manager,
        "wardkeep-auth",
        "logout",
        json!({"session_id": session_id}),
    );

    let after: CheckSessionResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "check_session",
        json!({"session_id": session_id}),
    );
    assert!(!after.valid);

    // The audit module sees the whole story.
    let activity: ActivityPage = call_entry(
        &mut manager,
        "wardkeep-audit",
        "recent_activity",
        json!({"user_uuid": user_uuid}),
    );
    let actions: Vec<&str> = activity.logs.iter().map(|l| l.action.as_str()).collect();
    assert!(actions.contains(&"user.signup"));
    assert!(actions.contains(&"user.login"));
    assert!(actions.contains(&"user.logout"));
}

#[test]
fn test_duplicate_signup_reports_taken_email() {
    let (dispatcher, _store) = test_bridge();
    let mut manager = manager_with_plugins(dispatcher);

    let first: SignupResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "signup",
        json!({"name": "Bob", "email": "bob@x.com", "password": "long enough"}),
    );
    assert!(first.success);

    let second: SignupResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "signup",
        json!({"name": "Bobby", "email": "bob@x.com", "password": "long enough"}),
    );
    assert!(!second.success);
    assert_eq!(second.message, "email already exists");
}

#[test]
fn test_password_reset_flow() {
    let (dispatcher, _store) = test_bridge();
    let mut manager = manager_with_plugins(dispatcher);

    let signup: SignupResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "signup",
        json!({"name": "Cara", "email": "cara@x.com", "password": "first password"}),
    );
    assert!(signup.success);

    let requested: plugin_auth::TokenResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "request_password_reset",
        json!({"email": "cara@x.com"}),
    );
    let token = requested.token.unwrap();

    let reset: plugin_auth::SimpleResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "reset_password",
        json!({"token": token, "new_password": "second password"}),
    );
    assert!(reset.success, "{}", reset.message);

    // Token is single use.
    let replay: plugin_auth::SimpleResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "reset_password",
        json!({"token": token, "new_password": "third password"}),
    );
    assert!(!replay.success);

    let old: LoginResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "login",
        json!({"email": "cara@x.com", "password": "first password"}),
    );
    assert!(!old.success);

    let new: LoginResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "login",
        json!({"email": "cara@x.com", "password": "second password"}),
    );
    assert!(new.success, "{}", new.message);
}

#[test]
fn test_email_verification_flow() {
    let (dispatcher, store) = test_bridge();
    let mut manager = manager_with_plugins(dispatcher);

    let signup: SignupResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "signup",
        json!({"name": "Dana", "email": "dana@x.com", "password": "long enough"}),
    );
    assert!(signup.success);
    assert!(!store
        .get_user_by_email("dana@x.com")
        .unwrap()
        .unwrap()
        .email_verified);

    let requested: plugin_auth::TokenResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "request_email_verification",
        json!({"email": "dana@x.com"}),
    );
    let token = requested.token.unwrap();

    let verified: plugin_auth::SimpleResponse = call_entry(
        &mut manager,
        "wardkeep-auth",
        "verify_email",
        json!({"token": token}),
    );
    assert!(verified.success);

    assert!(store
        .get_user_by_email("dana@x.com")
        .unwrap()
        .unwrap()
        .email_verified);
}

// ============================================================================
// Grant enforcement through a real module
// ============================================================================

/// A module whose manifest grants nothing, but which tries to create a user
/// anyway.
struct GreedyPlugin;

impl GuestModule for GreedyPlugin {
    fn manifest_toml(&self) -> &'static str {
        r#"
[plugin]
id = "greedy"
name = "Greedy"
version = "0.1.0"
"#
    }

    fn handle_call(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        _entry: &str,
        _input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        let result: Result<serde_json::Value, _> = bridge.call(
            tessera_bridge_core::CapabilityId::DbCreateUser,
            &json!({"name": "x", "email": "x@x.com", "password_hash": "h"}),
        );
        match result {
            Err(e) => Err(e.into()),
            Ok(_) => Ok(Vec::new()),
        }
    }
}

#[test]
fn test_ungranted_module_is_denied() {
    let (dispatcher, store) = test_bridge();
    let mut manager = PluginManager::new(dispatcher, 16);
    manager.install(Box::new(GreedyPlugin)).unwrap();

    let err = manager.call("greedy", "steal", b"{}").unwrap_err();
    assert!(err.to_string().contains("CapabilityDenied"));

    // The handler never ran.
    assert!(store.get_user_by_email("x@x.com").unwrap().is_none());
}

// ============================================================================
// Tick-driven retention
// ============================================================================

#[test]
fn test_tick_purges_expired_sessions_and_audits() {
    let (dispatcher, store) = test_bridge();
    let mut manager = manager_with_plugins(dispatcher.clone());

    // One live and one long-expired session, planted directly in the store.
    let now = Utc::now().timestamp();
    let user = store.create_user("Eve", "eve@x.com", "h", now).unwrap();
    store.create_session(&user.uuid, 3600, now).unwrap();
    let expired = store
        .create_session(&user.uuid, 10, now - 100)
        .unwrap()
        .unwrap();

    let ran = manager.tick_due();
    assert!(ran >= 1);

    // The expired session is gone, the live one is not.
    assert!(store.get_session(&expired.session_id, now).unwrap().is_none());
    assert_eq!(store.delete_user_sessions(&user.uuid).unwrap(), 1);

    // The purge left an audit trail under the system user.
    let mut caller = RawCaller::new(dispatcher);
    let env = caller.call(
        "db_query_audit_logs",
        json!({"action": "session.purge", "limit": 10, "offset": 0}),
    );
    assert!(env.success);
    let entries = env.data.unwrap()["entries"].as_array().unwrap().clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["user_uuid"], "system");
}
