//! Account and session flows for Wardkeep, implemented as a sandboxed
//! module.
//!
//! Everything this plugin does to host state goes through the bridge: user
//! rows, sessions and tokens are created by granted capabilities, password
//! salts come from `sys_random_bytes` (the sandbox has no entropy of its
//! own), and every flow leaves an audit entry. Passwords are hashed with
//! argon2 inside the sandbox so the host only ever sees a hash.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use serde_json::json;

use tessera_bridge_core::{CapabilityId, ErrorKind};
use tessera_guest::{BridgeCallError, BridgeClient, GuestError, GuestModule};

/// Manifest for the auth plugin; the same text would sit in an on-disk
/// `manifest.toml`.
pub const MANIFEST: &str = r#"
capabilities = [
    "sys_random_bytes",
    "db_create_user",
    "db_get_user_by_email",
    "db_get_user_credentials",
    "db_update_user_password",
    "db_set_email_verified",
    "db_create_session",
    "db_get_session",
    "db_delete_session",
    "db_create_verification_token",
    "db_consume_verification_token",
    "db_create_reset_token",
    "db_consume_reset_token",
    "db_create_audit_log",
]

[plugin]
id = "wardkeep-auth"
name = "Wardkeep Auth"
version = "0.1.0"
description = "Account signup, login and session management"
entry_points = [
    "signup",
    "login",
    "logout",
    "check_session",
    "request_password_reset",
    "reset_password",
    "request_email_verification",
    "verify_email",
]
"#;

const SALT_LEN: u32 = 16;
const SESSION_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;
const RESET_TOKEN_TTL_SECONDS: u64 = 60 * 60;
const VERIFICATION_TOKEN_TTL_SECONDS: u64 = 24 * 60 * 60;
const MIN_PASSWORD_LEN: usize = 8;

// ============================================================================
// Entry-point request/response shapes
// ============================================================================

#[derive(Deserialize)]
struct SignupRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct SignupResponse {
    pub success: bool,
    pub user_uuid: Option<String>,
    pub message: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub session_id: Option<String>,
    pub user_uuid: Option<String>,
    pub message: String,
}

#[derive(Deserialize)]
struct SessionRequest {
    session_id: String,
}

#[derive(Serialize, Deserialize)]
pub struct CheckSessionResponse {
    pub valid: bool,
    pub user_uuid: Option<String>,
    pub expires_at: Option<i64>,
}

#[derive(Deserialize)]
struct EmailRequest {
    email: String,
}

#[derive(Serialize, Deserialize)]
pub struct TokenResponse {
    pub success: bool,
    pub token: Option<String>,
    pub message: String,
}

#[derive(Deserialize)]
struct ResetPasswordRequest {
    token: String,
    new_password: String,
}

#[derive(Deserialize)]
struct VerifyEmailRequest {
    token: String,
}

#[derive(Serialize, Deserialize)]
pub struct SimpleResponse {
    pub success: bool,
    pub message: String,
}

// ============================================================================
// Capability wire shapes this plugin uses
// ============================================================================

#[derive(Deserialize)]
struct RandomBytes {
    bytes: Vec<u8>,
}

#[derive(Deserialize)]
struct CreatedUser {
    #[allow(dead_code)]
    id: i64,
    uuid: String,
}

#[derive(Deserialize)]
struct Credentials {
    uuid: String,
    password_hash: String,
}

#[derive(Deserialize)]
struct UserSummary {
    uuid: String,
}

#[derive(Deserialize)]
struct CreatedSession {
    session_id: String,
    expires_at: i64,
}

#[derive(Deserialize)]
struct SessionData {
    user_uuid: String,
    expires_at: i64,
}

#[derive(Deserialize)]
struct MintedToken {
    token: String,
}

#[derive(Deserialize)]
struct TokenOwner {
    user_uuid: String,
}

// ============================================================================
// Module
// ============================================================================

/// The auth module. Stateless between calls; all state lives host-side.
#[derive(Default)]
pub struct AuthPlugin;

impl AuthPlugin {
    pub fn new() -> Self {
        Self
    }

    fn hash_password(
        &self,
        bridge: &mut BridgeClient<'_>,
        password: &str,
    ) -> Result<String, GuestError> {
        let rand: RandomBytes =
            bridge.call(CapabilityId::SysRandomBytes, &json!({ "length": SALT_LEN }))?;
        let salt = SaltString::encode_b64(&rand.bytes)
            .map_err(|e| GuestError::Failed(format!("salt encoding: {e}")))?;
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| GuestError::Failed(format!("password hashing: {e}")))?;
        Ok(hash.to_string())
    }

    fn verify_password(&self, password: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    fn audit(
        &self,
        bridge: &mut BridgeClient<'_>,
        user_uuid: &str,
        action: &str,
        resource_id: Option<&str>,
    ) -> Result<(), GuestError> {
        let _: serde_json::Value = bridge.call(
            CapabilityId::DbCreateAuditLog,
            &json!({
                "user_uuid": user_uuid,
                "action": action,
                "resource_type": "auth",
                "resource_id": resource_id,
            }),
        )?;
        Ok(())
    }

    fn signup(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        let req: SignupRequest = parse_input(input)?;

        if req.name.trim().is_empty() || req.email.trim().is_empty() {
            return respond(&SignupResponse {
                success: false,
                user_uuid: None,
                message: "name and email are required".to_string(),
            });
        }
        if req.password.len() < MIN_PASSWORD_LEN {
            return respond(&SignupResponse {
                success: false,
                user_uuid: None,
                message: format!("password must be at least {MIN_PASSWORD_LEN} characters"),
            });
        }

        let password_hash = self.hash_password(bridge, &req.password)?;
        let created = bridge.call::<_, CreatedUser>(
            CapabilityId::DbCreateUser,
            &json!({
                "name": req.name,
                "email": req.email,
                "password_hash": password_hash,
            }),
        );

        match created {
            Ok(user) => {
                self.audit(bridge, &user.uuid, "user.signup", None)?;
                respond(&SignupResponse {
                    success: true,
                    user_uuid: Some(user.uuid),
                    message: "account created".to_string(),
                })
            }
            Err(BridgeCallError::Domain { kind, message })
                if kind == ErrorKind::Conflict || kind == ErrorKind::InvalidInput =>
            {
                respond(&SignupResponse {
                    success: false,
                    user_uuid: None,
                    message,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn login(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        let req: LoginRequest = parse_input(input)?;

        let creds: Option<Credentials> = bridge.call(
            CapabilityId::DbGetUserCredentials,
            &json!({ "email": req.email }),
        )?;

        // Same response whether the account is missing or the password is
        // wrong, so login cannot be used to probe for accounts.
        let Some(creds) = creds else {
            return respond(&LoginResponse {
                success: false,
                session_id: None,
                user_uuid: None,
                message: "invalid credentials".to_string(),
            });
        };
        if !self.verify_password(&req.password, &creds.password_hash) {
            return respond(&LoginResponse {
                success: false,
                session_id: None,
                user_uuid: None,
                message: "invalid credentials".to_string(),
            });
        }

        let session: CreatedSession = bridge.call(
            CapabilityId::DbCreateSession,
            &json!({
                "user_uuid": creds.uuid,
                "ttl_seconds": SESSION_TTL_SECONDS,
            }),
        )?;
        self.audit(bridge, &creds.uuid, "user.login", Some(&session.session_id))?;

        respond(&LoginResponse {
            success: true,
            session_id: Some(session.session_id),
            user_uuid: Some(creds.uuid),
            message: "logged in".to_string(),
        })
    }

    fn logout(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        let req: SessionRequest = parse_input(input)?;

        let session: Option<SessionData> = bridge.call(
            CapabilityId::DbGetSession,
            &json!({ "session_id": req.session_id }),
        )?;

        let _: serde_json::Value = bridge.call(
            CapabilityId::DbDeleteSession,
            &json!({ "session_id": req.session_id }),
        )?;

        if let Some(session) = session {
            self.audit(bridge, &session.user_uuid, "user.logout", Some(&req.session_id))?;
        }

        respond(&SimpleResponse {
            success: true,
            message: "logged out".to_string(),
        })
    }

    fn check_session(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        let req: SessionRequest = parse_input(input)?;

        let session: Option<SessionData> = bridge.call(
            CapabilityId::DbGetSession,
            &json!({ "session_id": req.session_id }),
        )?;

        match session {
            Some(s) => respond(&CheckSessionResponse {
                valid: true,
                user_uuid: Some(s.user_uuid),
                expires_at: Some(s.expires_at),
            }),
            None => respond(&CheckSessionResponse {
                valid: false,
                user_uuid: None,
                expires_at: None,
            }),
        }
    }

    fn request_password_reset(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        let req: EmailRequest = parse_input(input)?;

        let user: Option<UserSummary> = bridge.call(
            CapabilityId::DbGetUserByEmail,
            &json!({ "email": req.email }),
        )?;

        // Unknown addresses get the same success shape, minus a token.
        let Some(user) = user else {
            return respond(&TokenResponse {
                success: true,
                token: None,
                message: "if the account exists, a reset token was issued".to_string(),
            });
        };

        let minted: MintedToken = bridge.call(
            CapabilityId::DbCreateResetToken,
            &json!({
                "user_uuid": user.uuid,
                "ttl_seconds": RESET_TOKEN_TTL_SECONDS,
            }),
        )?;
        self.audit(bridge, &user.uuid, "user.reset_requested", None)?;

        respond(&TokenResponse {
            success: true,
            token: Some(minted.token),
            message: "if the account exists, a reset token was issued".to_string(),
        })
    }

    fn reset_password(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        let req: ResetPasswordRequest = parse_input(input)?;

        if req.new_password.len() < MIN_PASSWORD_LEN {
            return respond(&SimpleResponse {
                success: false,
                message: format!("password must be at least {MIN_PASSWORD_LEN} characters"),
            });
        }

        let owner: Option<TokenOwner> = bridge.call(
            CapabilityId::DbConsumeResetToken,
            &json!({ "token": req.token }),
        )?;
        let Some(owner) = owner else {
            return respond(&SimpleResponse {
                success: false,
                message: "invalid or expired token".to_string(),
            });
        };

        let password_hash = self.hash_password(bridge, &req.new_password)?;
        let _: serde_json::Value = bridge.call(
            CapabilityId::DbUpdateUserPassword,
            &json!({
                "uuid": owner.user_uuid,
                "password_hash": password_hash,
            }),
        )?;
        self.audit(bridge, &owner.user_uuid, "user.password_reset", None)?;

        respond(&SimpleResponse {
            success: true,
            message: "password updated".to_string(),
        })
    }

    fn request_email_verification(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        let req: EmailRequest = parse_input(input)?;

        let user: Option<UserSummary> = bridge.call(
            CapabilityId::DbGetUserByEmail,
            &json!({ "email": req.email }),
        )?;
        let Some(user) = user else {
            return respond(&TokenResponse {
                success: false,
                token: None,
                message: "no such account".to_string(),
            });
        };

        let minted: MintedToken = bridge.call(
            CapabilityId::DbCreateVerificationToken,
            &json!({
                "user_uuid": user.uuid,
                "ttl_seconds": VERIFICATION_TOKEN_TTL_SECONDS,
            }),
        )?;

        respond(&TokenResponse {
            success: true,
            token: Some(minted.token),
            message: "verification token issued".to_string(),
        })
    }

    fn verify_email(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        let req: VerifyEmailRequest = parse_input(input)?;

        let owner: Option<TokenOwner> = bridge.call(
            CapabilityId::DbConsumeVerificationToken,
            &json!({ "token": req.token }),
        )?;
        let Some(owner) = owner else {
            return respond(&SimpleResponse {
                success: false,
                message: "invalid or expired token".to_string(),
            });
        };

        let _: serde_json::Value = bridge.call(
            CapabilityId::DbSetEmailVerified,
            &json!({ "uuid": owner.user_uuid, "verified": true }),
        )?;
        self.audit(bridge, &owner.user_uuid, "user.email_verified", None)?;

        respond(&SimpleResponse {
            success: true,
            message: "email verified".to_string(),
        })
    }
}

impl GuestModule for AuthPlugin {
    fn manifest_toml(&self) -> &'static str {
        MANIFEST
    }

    fn handle_call(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        entry: &str,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        match entry {
            "signup" => self.signup(bridge, input),
            "login" => self.login(bridge, input),
            "logout" => self.logout(bridge, input),
            "check_session" => self.check_session(bridge, input),
            "request_password_reset" => self.request_password_reset(bridge, input),
            "reset_password" => self.reset_password(bridge, input),
            "request_email_verification" => self.request_email_verification(bridge, input),
            "verify_email" => self.verify_email(bridge, input),
            other => Err(GuestError::UnknownEntry(other.to_string())),
        }
    }
}

fn parse_input<T: serde::de::DeserializeOwned>(input: &[u8]) -> Result<T, GuestError> {
    serde_json::from_slice(input).map_err(|e| GuestError::InvalidInput(e.to_string()))
}

fn respond<T: Serialize>(response: &T) -> Result<Vec<u8>, GuestError> {
    Ok(serde_json::to_vec(response)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_sandbox::PluginManifest;

    #[test]
    fn test_manifest_parses_and_grants() {
        let manifest = PluginManifest::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.plugin.id, "wardkeep-auth");

        let grants = manifest.grants();
        assert!(grants.allows(CapabilityId::DbCreateUser));
        assert!(grants.allows(CapabilityId::SysRandomBytes));
        // Auth has no business touching audit queries or purges.
        assert!(!grants.allows(CapabilityId::DbQueryAuditLogs));
        assert!(!grants.allows(CapabilityId::DbPurgeExpiredSessions));
    }

    #[test]
    fn test_password_verify_round_trip() {
        // Hash with a fixed salt, then verify both outcomes.
        let salt = SaltString::encode_b64(&[7u8; 16]).unwrap();
        let hash = Argon2::default()
            .hash_password(b"correct horse", &salt)
            .unwrap()
            .to_string();

        let plugin = AuthPlugin::new();
        assert!(plugin.verify_password("correct horse", &hash));
        assert!(!plugin.verify_password("wrong horse", &hash));
        assert!(!plugin.verify_password("correct horse", "not-a-phc-string"));
    }
}
