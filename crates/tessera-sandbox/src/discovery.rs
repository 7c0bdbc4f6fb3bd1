//! Plugin discovery from well-known paths.
//!
//! Plugins are discovered from the following locations (in order):
//!
//! 1. `$XDG_DATA_HOME/wardkeep/plugins/` (user plugins)
//! 2. `$XDG_DATA_DIRS/wardkeep/plugins/` (system plugins)
//!
//! Each plugin is a directory containing a `manifest.toml` file. The first
//! manifest seen for an id wins, so user plugins shadow system ones.

use crate::error::SandboxResult;
use crate::manifest::PluginManifest;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Information about a discovered plugin.
#[derive(Debug, Clone)]
pub struct PluginPath {
    /// Path to the plugin directory.
    pub path: PathBuf,

    /// Parsed manifest.
    pub manifest: PluginManifest,
}

impl PluginPath {
    /// Get the plugin ID.
    pub fn id(&self) -> &str {
        &self.manifest.plugin.id
    }

    /// Get the plugin name.
    pub fn name(&self) -> &str {
        &self.manifest.plugin.name
    }

    /// Get the plugin version.
    pub fn version(&self) -> &str {
        &self.manifest.plugin.version
    }
}

/// Get the user plugins directory.
pub fn user_plugins_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "raibid-labs", "wardkeep")
        .map(|dirs| dirs.data_dir().join("plugins"))
}

/// Get the system plugins directories.
pub fn system_plugins_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    // Check XDG_DATA_DIRS
    if let Ok(data_dirs) = std::env::var("XDG_DATA_DIRS") {
        for dir in data_dirs.split(':') {
            let plugin_dir = PathBuf::from(dir).join("wardkeep/plugins");
            if plugin_dir.exists() {
                dirs.push(plugin_dir);
            }
        }
    }

    // Default system locations
    let default_dirs = [
        "/usr/local/share/wardkeep/plugins",
        "/usr/share/wardkeep/plugins",
    ];

    for dir in default_dirs {
        let path = PathBuf::from(dir);
        if path.exists() && !dirs.contains(&path) {
            dirs.push(path);
        }
    }

    dirs
}

/// Discover all plugins from well-known paths.
pub fn discover_plugins() -> SandboxResult<Vec<PluginPath>> {
    let mut plugins = Vec::new();
    let mut seen_ids = std::collections::HashSet::new();

    // User plugins have priority
    if let Some(user_dir) = user_plugins_dir() {
        debug!("Scanning user plugins directory: {:?}", user_dir);
        discover_in_directory(&user_dir, &mut plugins, &mut seen_ids)?;
    }

    // System plugins
    for sys_dir in system_plugins_dirs() {
        debug!("Scanning system plugins directory: {:?}", sys_dir);
        discover_in_directory(&sys_dir, &mut plugins, &mut seen_ids)?;
    }

    info!("Discovered {} plugins", plugins.len());
    Ok(plugins)
}

/// Discover plugins in a specific directory.
pub fn discover_in_directory(
    dir: &Path,
    plugins: &mut Vec<PluginPath>,
    seen_ids: &mut std::collections::HashSet<String>,
) -> SandboxResult<()> {
    if !dir.exists() {
        return Ok(());
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Failed to read plugins directory {:?}: {}", dir, e);
            return Ok(());
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if !path.is_dir() {
            continue;
        }

        let manifest_path = path.join("manifest.toml");
        if !manifest_path.exists() {
            debug!("Skipping {:?}: no manifest.toml", path);
            continue;
        }

        match PluginManifest::from_file(&manifest_path) {
            Ok(manifest) => {
                let id = manifest.plugin.id.clone();

                // Skip if we've already seen this plugin (user plugins take priority)
                if seen_ids.contains(&id) {
                    debug!("Skipping duplicate plugin: {}", id);
                    continue;
                }

                info!(
                    "Discovered plugin: {} v{} at {:?}",
                    manifest.plugin.name, manifest.plugin.version, path
                );

                seen_ids.insert(id);
                plugins.push(PluginPath { path, manifest });
            }
            Err(e) => {
                warn!("Failed to load manifest from {:?}: {}", manifest_path, e);
            }
        }
    }

    Ok(())
}

/// Discover a single plugin from a path.
pub fn discover_plugin(path: &Path) -> SandboxResult<PluginPath> {
    let manifest_path = path.join("manifest.toml");
    let manifest = PluginManifest::from_file(&manifest_path)?;

    Ok(PluginPath {
        path: path.to_path_buf(),
        manifest,
    })
}
