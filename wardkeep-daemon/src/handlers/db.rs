//! Database capability handlers.
//!
//! Each handler parses its declared request shape, runs one store operation,
//! and shapes the success `data`. Absence on lookups is `null` data, not an
//! error; mutations of rows that must exist report `not_found`; the email
//! uniqueness constraint surfaces as `conflict`.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use tessera_bridge_core::DomainError;
use tessera_host::{typed, Handler};

use crate::store::{AuditQuery, NewAuditLog, Store, StoreError, TokenKind};

const MAX_AUDIT_PAGE: i64 = 500;

fn now() -> i64 {
    Utc::now().timestamp()
}

fn internal(err: StoreError) -> DomainError {
    DomainError::internal(err)
}

/// Serialize an optional record as `data` or `null` - absence is a valid
/// result.
fn or_null<T: serde::Serialize>(value: Option<T>) -> Result<Value, DomainError> {
    match value {
        Some(v) => serde_json::to_value(v).map_err(DomainError::internal),
        None => Ok(Value::Null),
    }
}

fn clamp_page(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_AUDIT_PAGE), offset.max(0))
}

// ============================================================================
// Users
// ============================================================================

#[derive(Deserialize)]
struct CreateUserRequest {
    name: String,
    email: String,
    password_hash: String,
}

pub fn create_user(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: CreateUserRequest| {
        if req.name.trim().is_empty() || req.password_hash.is_empty() {
            return Err(DomainError::invalid_input("name and password_hash are required"));
        }
        if req.email.trim().is_empty() || !req.email.contains('@') {
            return Err(DomainError::invalid_input("a valid email is required"));
        }

        match store.create_user(&req.name, &req.email, &req.password_hash, now()) {
            Ok(user) => Ok(json!({ "id": user.id, "uuid": user.uuid })),
            Err(StoreError::EmailTaken) => Err(DomainError::conflict("email already exists")),
            Err(e) => Err(internal(e)),
        }
    })
}

#[derive(Deserialize)]
struct EmailRequest {
    email: String,
}

pub fn get_user_by_email(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: EmailRequest| {
        or_null(store.get_user_by_email(&req.email).map_err(internal)?)
    })
}

#[derive(Deserialize)]
struct UuidRequest {
    uuid: String,
}

pub fn get_user_by_uuid(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: UuidRequest| {
        or_null(store.get_user_by_uuid(&req.uuid).map_err(internal)?)
    })
}

pub fn get_user_credentials(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: EmailRequest| {
        or_null(store.get_user_credentials(&req.email).map_err(internal)?)
    })
}

#[derive(Deserialize)]
struct UpdatePasswordRequest {
    uuid: String,
    password_hash: String,
}

pub fn update_user_password(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: UpdatePasswordRequest| {
        if req.password_hash.is_empty() {
            return Err(DomainError::invalid_input("password_hash is required"));
        }
        match store
            .update_user_password(&req.uuid, &req.password_hash, now())
            .map_err(internal)?
        {
            true => Ok(json!({ "updated": true })),
            false => Err(DomainError::not_found("no such user")),
        }
    })
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    uuid: String,
    name: Option<String>,
    bio: Option<String>,
    avatar: Option<String>,
}

pub fn update_user_profile(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: UpdateProfileRequest| {
        if let Some(name) = &req.name {
            if name.trim().is_empty() {
                return Err(DomainError::invalid_input("name cannot be blank"));
            }
        }
        match store
            .update_user_profile(
                &req.uuid,
                req.name.as_deref(),
                req.bio.as_deref(),
                req.avatar.as_deref(),
                now(),
            )
            .map_err(internal)?
        {
            true => Ok(json!({ "updated": true })),
            false => Err(DomainError::not_found("no such user")),
        }
    })
}

#[derive(Deserialize)]
struct SetEmailVerifiedRequest {
    uuid: String,
    verified: bool,
}

pub fn set_email_verified(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: SetEmailVerifiedRequest| {
        match store
            .set_email_verified(&req.uuid, req.verified, now())
            .map_err(internal)?
        {
            true => Ok(json!({ "updated": true })),
            false => Err(DomainError::not_found("no such user")),
        }
    })
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Deserialize)]
struct CreateSessionRequest {
    user_uuid: String,
    ttl_seconds: u64,
}

pub fn create_session(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: CreateSessionRequest| {
        if req.ttl_seconds == 0 {
            return Err(DomainError::invalid_input("ttl_seconds must be positive"));
        }
        match store
            .create_session(&req.user_uuid, req.ttl_seconds, now())
            .map_err(internal)?
        {
            Some(session) => Ok(json!({
                "session_id": session.session_id,
                "expires_at": session.expires_at,
            })),
            None => Err(DomainError::not_found("no such user")),
        }
    })
}

#[derive(Deserialize)]
struct SessionIdRequest {
    session_id: String,
}

pub fn get_session(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: SessionIdRequest| {
        or_null(store.get_session(&req.session_id, now()).map_err(internal)?)
    })
}

pub fn delete_session(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: SessionIdRequest| {
        let deleted = store.delete_session(&req.session_id).map_err(internal)?;
        Ok(json!({ "deleted": deleted }))
    })
}

pub fn delete_user_sessions(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: UuidRequest| {
        let deleted = store.delete_user_sessions(&req.uuid).map_err(internal)?;
        Ok(json!({ "deleted": deleted }))
    })
}

#[derive(Deserialize)]
struct Empty {}

pub fn purge_expired_sessions(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, _req: Empty| {
        let purged = store.purge_expired_sessions(now()).map_err(internal)?;
        Ok(json!({ "purged": purged }))
    })
}

// ============================================================================
// Single-use tokens
// ============================================================================

#[derive(Deserialize)]
struct CreateTokenRequest {
    user_uuid: String,
    ttl_seconds: u64,
}

fn create_token(store: Arc<dyn Store>, kind: TokenKind) -> Arc<dyn Handler> {
    typed(move |_ctx, req: CreateTokenRequest| {
        if req.ttl_seconds == 0 {
            return Err(DomainError::invalid_input("ttl_seconds must be positive"));
        }
        match store
            .create_token(kind, &req.user_uuid, req.ttl_seconds, now())
            .map_err(internal)?
        {
            Some(minted) => serde_json::to_value(minted).map_err(DomainError::internal),
            None => Err(DomainError::not_found("no such user")),
        }
    })
}

#[derive(Deserialize)]
struct TokenRequest {
    token: String,
}

fn consume_token(store: Arc<dyn Store>, kind: TokenKind) -> Arc<dyn Handler> {
    typed(move |_ctx, req: TokenRequest| {
        match store.consume_token(kind, &req.token, now()).map_err(internal)? {
            Some(user_uuid) => Ok(json!({ "user_uuid": user_uuid })),
            None => Ok(Value::Null),
        }
    })
}

pub fn create_verification_token(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    create_token(store, TokenKind::Verification)
}

pub fn consume_verification_token(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    consume_token(store, TokenKind::Verification)
}

pub fn create_reset_token(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    create_token(store, TokenKind::Reset)
}

pub fn consume_reset_token(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    consume_token(store, TokenKind::Reset)
}

// ============================================================================
// Audit logs
// ============================================================================

#[derive(Deserialize)]
struct CreateAuditLogRequest {
    user_uuid: String,
    action: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    metadata: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

pub fn create_audit_log(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: CreateAuditLogRequest| {
        if req.user_uuid.trim().is_empty() || req.action.trim().is_empty() {
            return Err(DomainError::invalid_input("user_uuid and action are required"));
        }
        let entry = NewAuditLog {
            user_uuid: req.user_uuid,
            action: req.action,
            resource_type: req.resource_type,
            resource_id: req.resource_id,
            metadata: req.metadata,
            ip_address: req.ip_address,
            user_agent: req.user_agent,
        };
        let id = store.create_audit_log(&entry, now()).map_err(internal)?;
        Ok(json!({ "id": id }))
    })
}

#[derive(Deserialize)]
struct ListAuditLogsRequest {
    user_uuid: String,
    limit: i64,
    offset: i64,
}

pub fn list_audit_logs(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: ListAuditLogsRequest| {
        let (limit, offset) = clamp_page(req.limit, req.offset);
        let entries = store
            .list_audit_logs(&req.user_uuid, limit, offset)
            .map_err(internal)?;
        Ok(json!({ "entries": entries }))
    })
}

#[derive(Deserialize)]
struct QueryAuditLogsRequest {
    user_uuid: Option<String>,
    action: Option<String>,
    resource_type: Option<String>,
    start_time: Option<i64>,
    end_time: Option<i64>,
    limit: i64,
    offset: i64,
}

pub fn query_audit_logs(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: QueryAuditLogsRequest| {
        let (limit, offset) = clamp_page(req.limit, req.offset);
        let entries = store
            .query_audit_logs(&AuditQuery {
                user_uuid: req.user_uuid,
                action: req.action,
                resource_type: req.resource_type,
                start_time: req.start_time,
                end_time: req.end_time,
                limit,
                offset,
            })
            .map_err(internal)?;
        Ok(json!({ "entries": entries }))
    })
}

pub fn count_audit_logs(store: Arc<dyn Store>) -> Arc<dyn Handler> {
    typed(move |_ctx, req: UuidRequest| {
        let count = store.count_audit_logs(&req.uuid).map_err(internal)?;
        Ok(json!({ "count": count }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use tessera_bridge_core::ErrorKind;
    use tessera_host::CallContext;

    fn store() -> Arc<dyn Store> {
        Arc::new(SqliteStore::open_in_memory().unwrap())
    }

    fn ctx() -> CallContext {
        CallContext::new("test-plugin")
    }

    #[test]
    fn test_create_user_shapes() {
        let store = store();
        let handler = create_user(store);

        let out = handler
            .call(
                &ctx(),
                json!({"name": "alice", "email": "a@x.com", "password_hash": "h1"}),
            )
            .unwrap();
        assert_eq!(out["id"], 1);
        assert!(out["uuid"].is_string());

        // Identical call: the uniqueness constraint decides.
        let err = handler
            .call(
                &ctx(),
                json!({"name": "alice", "email": "a@x.com", "password_hash": "h1"}),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.message, "email already exists");
    }

    #[test]
    fn test_create_user_validation() {
        let handler = create_user(store());
        let err = handler
            .call(
                &ctx(),
                json!({"name": "alice", "email": "not-an-email", "password_hash": "h"}),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_lookup_miss_is_null_not_error() {
        let handler = get_session(store());
        let out = handler
            .call(&ctx(), json!({"session_id": "nonexistent"}))
            .unwrap();
        assert!(out.is_null());

        // Stable on repeat: absence does not compound.
        let again = handler
            .call(&ctx(), json!({"session_id": "nonexistent"}))
            .unwrap();
        assert!(again.is_null());
    }

    #[test]
    fn test_user_record_never_carries_password_hash() {
        let store = store();
        create_user(store.clone())
            .call(
                &ctx(),
                json!({"name": "alice", "email": "a@x.com", "password_hash": "h1"}),
            )
            .unwrap();

        let user = get_user_by_email(store.clone())
            .call(&ctx(), json!({"email": "a@x.com"}))
            .unwrap();
        assert!(user.get("password_hash").is_none());
        assert_eq!(user["email"], "a@x.com");

        // The credentials capability is the only path to the hash.
        let creds = get_user_credentials(store)
            .call(&ctx(), json!({"email": "a@x.com"}))
            .unwrap();
        assert_eq!(creds["password_hash"], "h1");
    }

    #[test]
    fn test_session_round_trip_through_handlers() {
        let store = store();
        let created = create_user(store.clone())
            .call(
                &ctx(),
                json!({"name": "bob", "email": "b@x.com", "password_hash": "h"}),
            )
            .unwrap();
        let uuid = created["uuid"].as_str().unwrap();

        let session = create_session(store.clone())
            .call(&ctx(), json!({"user_uuid": uuid, "ttl_seconds": 3600}))
            .unwrap();
        let sid = session["session_id"].as_str().unwrap();

        let fetched = get_session(store.clone())
            .call(&ctx(), json!({"session_id": sid}))
            .unwrap();
        assert_eq!(fetched["user_uuid"], created["uuid"]);

        let deleted = delete_session(store.clone())
            .call(&ctx(), json!({"session_id": sid}))
            .unwrap();
        assert_eq!(deleted["deleted"], true);

        let gone = get_session(store)
            .call(&ctx(), json!({"session_id": sid}))
            .unwrap();
        assert!(gone.is_null());
    }

    #[test]
    fn test_create_session_for_missing_user() {
        let handler = create_session(store());
        let err = handler
            .call(&ctx(), json!({"user_uuid": "ghost", "ttl_seconds": 60}))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let handler = create_session(store());
        let err = handler
            .call(&ctx(), json!({"user_uuid": "u", "ttl_seconds": 0}))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_token_mint_and_consume() {
        let store = store();
        let created = create_user(store.clone())
            .call(
                &ctx(),
                json!({"name": "cara", "email": "c@x.com", "password_hash": "h"}),
            )
            .unwrap();
        let uuid = created["uuid"].as_str().unwrap();

        let minted = create_reset_token(store.clone())
            .call(&ctx(), json!({"user_uuid": uuid, "ttl_seconds": 600}))
            .unwrap();
        let token = minted["token"].as_str().unwrap();

        let consumed = consume_reset_token(store.clone())
            .call(&ctx(), json!({"token": token}))
            .unwrap();
        assert_eq!(consumed["user_uuid"].as_str().unwrap(), uuid);

        // Single use: a second redemption is a null, not an error.
        let again = consume_reset_token(store)
            .call(&ctx(), json!({"token": token}))
            .unwrap();
        assert!(again.is_null());
    }

    #[test]
    fn test_audit_page_clamping() {
        let store = store();
        create_audit_log(store.clone())
            .call(&ctx(), json!({"user_uuid": "u-1", "action": "x"}))
            .unwrap();

        // An absurd limit is clamped, not an error.
        let out = list_audit_logs(store)
            .call(
                &ctx(),
                json!({"user_uuid": "u-1", "limit": 100000, "offset": -5}),
            )
            .unwrap();
        assert_eq!(out["entries"].as_array().unwrap().len(), 1);
    }
}
