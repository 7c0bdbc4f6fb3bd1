//! Plugin lifecycle management.
//!
//! The manager installs built-in modules, merges on-disk discovery (a
//! discovered manifest without a loadable module is listed but not
//! instantiated - the daemon has no code loader for foreign modules), and
//! fans calls and ticks out to the loaded sandboxes.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use tessera_guest::GuestModule;
use tessera_host::Dispatcher;
use tessera_sandbox::{discover_in_directory, discover_plugins, PluginPath};

use crate::sandbox::ModuleSandbox;

/// Status row for one known plugin.
#[derive(Debug, Clone)]
pub struct PluginStatus {
    pub id: String,
    pub name: String,
    pub version: String,
    pub tick_interval: Option<u64>,
    /// Discovered on disk but not instantiated.
    pub external: bool,
}

/// Manages loaded plugin sandboxes and discovered manifests.
pub struct PluginManager {
    modules: HashMap<String, ModuleSandbox>,
    last_tick: HashMap<String, Instant>,
    external: Vec<PluginPath>,
    dispatcher: Arc<Dispatcher>,
    max_memory_pages: u32,
}

impl PluginManager {
    pub fn new(dispatcher: Arc<Dispatcher>, max_memory_pages: u32) -> Self {
        Self {
            modules: HashMap::new(),
            last_tick: HashMap::new(),
            external: Vec::new(),
            dispatcher,
            max_memory_pages,
        }
    }

    /// Install and initialize a built-in module.
    pub fn install(&mut self, module: Box<dyn GuestModule>) -> Result<String> {
        let mut sandbox = ModuleSandbox::new(
            module,
            Arc::clone(&self.dispatcher),
            self.max_memory_pages,
        )?;
        let id = sandbox.id().to_string();

        if self.modules.contains_key(&id) {
            return Err(anyhow!("plugin '{id}' is already loaded"));
        }

        sandbox
            .init()
            .map_err(|e| anyhow!("plugin '{id}' failed to initialize: {e}"))?;

        info!("Registered plugin: {} v{}", id, sandbox.manifest().plugin.version);
        self.modules.insert(id.clone(), sandbox);
        Ok(id)
    }

    /// Scan well-known paths plus any configured extra directories for
    /// plugin manifests. Manifests whose id matches a loaded module are
    /// ignored; the rest are listed as external.
    pub fn discover_external(&mut self, extra_dirs: &[PathBuf]) {
        let mut found = match discover_plugins() {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Plugin discovery failed: {}", e);
                Vec::new()
            }
        };

        let mut seen: std::collections::HashSet<String> =
            found.iter().map(|p| p.id().to_string()).collect();
        for dir in extra_dirs {
            if let Err(e) = discover_in_directory(dir, &mut found, &mut seen) {
                warn!("Failed to scan plugin directory {:?}: {}", dir, e);
            }
        }

        found.retain(|p| !self.modules.contains_key(p.id()));
        for path in &found {
            info!(
                "External plugin manifest: {} v{} (no module loader, listed only)",
                path.name(),
                path.version()
            );
        }
        self.external = found;
    }

    /// Invoke an entry point on a loaded plugin.
    pub fn call(&mut self, plugin_id: &str, entry: &str, input: &[u8]) -> Result<Vec<u8>> {
        let sandbox = self
            .modules
            .get_mut(plugin_id)
            .ok_or_else(|| anyhow!("plugin not found: {plugin_id}"))?;
        sandbox
            .call(entry, input)
            .map_err(|e| anyhow!("plugin '{plugin_id}' entry '{entry}' failed: {e}"))
    }

    /// Tick every module whose manifest interval has elapsed. Returns how
    /// many ran.
    pub fn tick_due(&mut self) -> usize {
        let now = Instant::now();
        let mut ran = 0;

        for (id, sandbox) in self.modules.iter_mut() {
            let Some(interval) = sandbox.manifest().tick_interval() else {
                continue;
            };
            let due = match self.last_tick.get(id) {
                Some(last) => now.duration_since(*last) >= Duration::from_secs(interval),
                None => true,
            };
            if !due {
                continue;
            }

            self.last_tick.insert(id.clone(), now);
            match sandbox.tick() {
                Ok(()) => ran += 1,
                Err(e) => warn!(plugin = %id, "tick failed: {}", e),
            }
        }

        ran
    }

    /// Status of every known plugin, loaded and external.
    pub fn list(&self) -> Vec<PluginStatus> {
        let mut statuses: Vec<PluginStatus> = self
            .modules
            .values()
            .map(|s| PluginStatus {
                id: s.id().to_string(),
                name: s.manifest().plugin.name.clone(),
                version: s.manifest().plugin.version.clone(),
                tick_interval: s.manifest().tick_interval(),
                external: false,
            })
            .collect();

        statuses.extend(self.external.iter().map(|p| PluginStatus {
            id: p.id().to_string(),
            name: p.name().to_string(),
            version: p.version().to_string(),
            tick_interval: p.manifest.tick_interval(),
            external: true,
        }));

        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Number of loaded (instantiated) plugins.
    pub fn plugin_count(&self) -> usize {
        self.modules.len()
    }
}
