//! Audit trail module: records events on behalf of other components,
//! serves paged activity queries, and reclaims expired sessions on its
//! periodic tick.

use serde::{Deserialize, Serialize};
use serde_json::json;

use tessera_bridge_core::CapabilityId;
use tessera_guest::{BridgeClient, GuestError, GuestModule};

/// Manifest for the audit plugin.
pub const MANIFEST: &str = r#"
capabilities = [
    "db_create_audit_log",
    "db_list_audit_logs",
    "db_query_audit_logs",
    "db_count_audit_logs",
    "db_purge_expired_sessions",
]

[plugin]
id = "wardkeep-audit"
name = "Wardkeep Audit"
version = "0.1.0"
description = "Audit log recording, queries and session retention"
entry_points = ["record_event", "recent_activity", "search"]

[tick]
interval_seconds = 30
"#;

const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 500;

// ============================================================================
// Entry-point request/response shapes
// ============================================================================

#[derive(Deserialize)]
struct RecordEventRequest {
    user_uuid: String,
    action: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    metadata: Option<serde_json::Value>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct RecordEventResponse {
    pub success: bool,
    pub id: Option<i64>,
    pub message: String,
}

#[derive(Deserialize)]
struct RecentActivityRequest {
    user_uuid: String,
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct SearchRequest {
    user_uuid: Option<String>,
    action: Option<String>,
    resource_type: Option<String>,
    start_time: Option<i64>,
    end_time: Option<i64>,
    page: Option<i64>,
    limit: Option<i64>,
}

/// One audit entry, as the host returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
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

#[derive(Serialize, Deserialize)]
pub struct ActivityPage {
    pub logs: Vec<AuditEntry>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

#[derive(Serialize, Deserialize)]
pub struct SearchResponse {
    pub logs: Vec<AuditEntry>,
    pub page: i64,
    pub limit: i64,
}

// ============================================================================
// Capability wire shapes
// ============================================================================

#[derive(Deserialize)]
struct CreatedEntry {
    id: i64,
}

#[derive(Deserialize)]
struct Entries {
    entries: Vec<AuditEntry>,
}

#[derive(Deserialize)]
struct Count {
    count: i64,
}

#[derive(Deserialize)]
struct Purged {
    purged: u64,
}

// ============================================================================
// Module
// ============================================================================

/// The audit module. Tracks nothing between calls beyond tick stats.
#[derive(Default)]
pub struct AuditPlugin {
    ticks_run: u64,
    sessions_purged: u64,
}

impl AuditPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions reclaimed across all ticks so far.
    pub fn sessions_purged(&self) -> u64 {
        self.sessions_purged
    }

    fn record_event(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        let req: RecordEventRequest = parse_input(input)?;

        if req.action.trim().is_empty() {
            return respond(&RecordEventResponse {
                success: false,
                id: None,
                message: "action is required".to_string(),
            });
        }

        // Metadata travels as a compact JSON string, as the store keeps it.
        let metadata = match &req.metadata {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };

        let created: CreatedEntry = bridge.call(
            CapabilityId::DbCreateAuditLog,
            &json!({
                "user_uuid": req.user_uuid,
                "action": req.action,
                "resource_type": req.resource_type,
                "resource_id": req.resource_id,
                "metadata": metadata,
                "ip_address": req.ip_address,
                "user_agent": req.user_agent,
            }),
        )?;

        respond(&RecordEventResponse {
            success: true,
            id: Some(created.id),
            message: "recorded".to_string(),
        })
    }

    fn recent_activity(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        let req: RecentActivityRequest = parse_input(input)?;
        let (page, limit) = page_params(req.page, req.limit);

        let listed: Entries = bridge.call(
            CapabilityId::DbListAuditLogs,
            &json!({
                "user_uuid": req.user_uuid,
                "limit": limit,
                "offset": page * limit,
            }),
        )?;
        let total: Count = bridge.call(
            CapabilityId::DbCountAuditLogs,
            &json!({ "user_uuid": req.user_uuid }),
        )?;

        let pages = if total.count == 0 {
            0
        } else {
            (total.count + limit - 1) / limit
        };

        respond(&ActivityPage {
            logs: listed.entries,
            total: total.count,
            page,
            limit,
            pages,
        })
    }

    fn search(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError> {
        let req: SearchRequest = parse_input(input)?;
        let (page, limit) = page_params(req.page, req.limit);

        let found: Entries = bridge.call(
            CapabilityId::DbQueryAuditLogs,
            &json!({
                "user_uuid": req.user_uuid,
                "action": req.action,
                "resource_type": req.resource_type,
                "start_time": req.start_time,
                "end_time": req.end_time,
                "limit": limit,
                "offset": page * limit,
            }),
        )?;

        respond(&SearchResponse {
            logs: found.entries,
            page,
            limit,
        })
    }
}

impl GuestModule for AuditPlugin {
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
            "record_event" => self.record_event(bridge, input),
            "recent_activity" => self.recent_activity(bridge, input),
            "search" => self.search(bridge, input),
            other => Err(GuestError::UnknownEntry(other.to_string())),
        }
    }

    fn on_tick(&mut self, bridge: &mut BridgeClient<'_>) -> Result<(), GuestError> {
        self.ticks_run += 1;

        let purged: Purged =
            bridge.call(CapabilityId::DbPurgeExpiredSessions, &json!({}))?;
        if purged.purged > 0 {
            self.sessions_purged += purged.purged;
            let _: CreatedEntry = bridge.call(
                CapabilityId::DbCreateAuditLog,
                &json!({
                    "user_uuid": "system",
                    "action": "session.purge",
                    "resource_type": "session",
                    "metadata": format!("{{\"purged\":{}}}", purged.purged),
                }),
            )?;
        }
        Ok(())
    }
}

fn page_params(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(0).max(0);
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    (page, limit)
}

fn parse_input<T: serde::de::DeserializeOwned>(input: &[u8]) -> Result<T, GuestError> {
    serde_json::from_slice(input).map_err(|e| GuestError::InvalidInput(e.to_string()))
}

fn respond<T: Serialize>(response: &T) -> Result<Vec<u8>, GuestError> {
    Ok(serde_json::to_vec(response)?)
}
