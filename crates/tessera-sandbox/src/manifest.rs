//! Plugin manifest parsing.
//!
//! Each plugin carries a `manifest.toml` describing its metadata and the
//! capabilities it is allowed to invoke. Built-in modules embed the same
//! text. Grants are validated against the capability table at parse time so
//! a typo fails the load, not the first call.

use crate::error::{SandboxError, SandboxResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tessera_bridge_core::CapabilityGrants;

/// Plugin manifest structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin metadata.
    pub plugin: PluginMetadata,

    /// Capabilities the plugin may invoke across the bridge.
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Periodic tick configuration.
    #[serde(default)]
    pub tick: Option<TickConfig>,

    /// Custom configuration key-value pairs.
    #[serde(default)]
    pub config: HashMap<String, toml::Value>,
}

/// Plugin metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Unique identifier for the plugin.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Version string (semver).
    pub version: String,

    /// Plugin description.
    #[serde(default)]
    pub description: Option<String>,

    /// Plugin author(s).
    #[serde(default)]
    pub authors: Vec<String>,

    /// Entry points the plugin exports to the host.
    #[serde(default)]
    pub entry_points: Vec<String>,
}

/// Periodic tick configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickConfig {
    /// Seconds between host-initiated `on_tick` calls.
    pub interval_seconds: u64,
}

impl PluginManifest {
    /// Load a manifest from a TOML file.
    pub fn from_file(path: &Path) -> SandboxResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a manifest from a TOML string.
    pub fn from_str(content: &str) -> SandboxResult<Self> {
        let manifest: PluginManifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest.
    fn validate(&self) -> SandboxResult<()> {
        if self.plugin.id.is_empty() {
            return Err(SandboxError::InvalidManifest(
                "plugin id cannot be empty".to_string(),
            ));
        }

        if self.plugin.name.is_empty() {
            return Err(SandboxError::InvalidManifest(
                "plugin name cannot be empty".to_string(),
            ));
        }

        if self.plugin.version.is_empty() {
            return Err(SandboxError::InvalidManifest(
                "plugin version cannot be empty".to_string(),
            ));
        }

        if let Some(tick) = &self.tick {
            if tick.interval_seconds == 0 {
                return Err(SandboxError::InvalidManifest(
                    "tick interval cannot be zero".to_string(),
                ));
            }
        }

        // Reject unknown capability names up front.
        CapabilityGrants::from_strings(&self.capabilities)?;

        Ok(())
    }

    /// The grant set for this plugin.
    pub fn grants(&self) -> CapabilityGrants {
        // Validated in from_str; an empty set only if the list was empty.
        CapabilityGrants::from_strings(&self.capabilities).unwrap_or_default()
    }

    /// Seconds between ticks, if the plugin asks to be ticked.
    pub fn tick_interval(&self) -> Option<u64> {
        self.tick.as_ref().map(|t| t.interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_bridge_core::CapabilityId;

    #[test]
    fn test_parse_manifest() {
        let toml = r#"
capabilities = ["db_create_audit_log", "sys_get_timestamp"]

[plugin]
id = "test-audit"
name = "Test Audit"
version = "0.1.0"
description = "Records things"
entry_points = ["record_event"]

[tick]
interval_seconds = 30
"#;

        let manifest = PluginManifest::from_str(toml).unwrap();
        assert_eq!(manifest.plugin.id, "test-audit");
        assert_eq!(manifest.plugin.entry_points, vec!["record_event"]);
        assert_eq!(manifest.tick_interval(), Some(30));

        let grants = manifest.grants();
        assert!(grants.allows(CapabilityId::DbCreateAuditLog));
        assert!(!grants.allows(CapabilityId::DbCreateUser));
    }

    #[test]
    fn test_empty_id_rejected() {
        let toml = r#"
[plugin]
id = ""
name = "Test"
version = "0.1.0"
"#;
        assert!(PluginManifest::from_str(toml).is_err());
    }

    #[test]
    fn test_unknown_capability_rejected() {
        let toml = r#"
capabilities = ["db_create_user", "db_read_everything"]

[plugin]
id = "greedy"
name = "Greedy"
version = "0.1.0"
"#;
        let err = PluginManifest::from_str(toml).unwrap_err();
        assert!(matches!(err, SandboxError::UnknownCapability(_)));
    }

    #[test]
    fn test_zero_tick_interval_rejected() {
        let toml = r#"
[plugin]
id = "ticky"
name = "Ticky"
version = "0.1.0"

[tick]
interval_seconds = 0
"#;
        assert!(PluginManifest::from_str(toml).is_err());
    }

    #[test]
    fn test_no_capabilities_means_no_grants() {
        let toml = r#"
[plugin]
id = "inert"
name = "Inert"
version = "0.1.0"
"#;
        let manifest = PluginManifest::from_str(toml).unwrap();
        assert!(manifest.grants().is_empty());
        assert_eq!(manifest.tick_interval(), None);
    }
}
