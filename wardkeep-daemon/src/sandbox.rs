//! Per-plugin sandbox glue.
//!
//! A [`ModuleSandbox`] owns everything one loaded plugin needs: the module
//! itself, its private linear memory, the grant set parsed from its
//! manifest, and an adapter that exposes the shared dispatcher as the
//! module's imported bridge function. Guest heap state is reset between
//! entry-point invocations, enforcing the single-invocation buffer scope.

use std::sync::Arc;

use tessera_bridge_core::{CapabilityGrants, MemoryHandle};
use tessera_guest::{BridgeClient, GuestError, GuestModule, HostBridge};
use tessera_host::Dispatcher;
use tessera_sandbox::{LinearMemory, PluginManifest, SandboxResult};
use tracing::info;

/// The dispatcher, narrowed to one plugin's identity and grants.
struct DispatcherBridge {
    dispatcher: Arc<Dispatcher>,
    grants: CapabilityGrants,
    plugin_id: String,
}

impl HostBridge for DispatcherBridge {
    fn invoke(&self, mem: &mut LinearMemory, name: MemoryHandle, request: MemoryHandle) -> u64 {
        self.dispatcher
            .dispatch(mem, &self.grants, &self.plugin_id, name, request)
    }
}

/// One loaded plugin: module + memory + bridge identity.
pub struct ModuleSandbox {
    manifest: PluginManifest,
    module: Box<dyn GuestModule>,
    memory: LinearMemory,
    bridge: DispatcherBridge,
}

impl ModuleSandbox {
    /// Wire a module up to the shared dispatcher. Parses and validates the
    /// embedded manifest; a bad manifest fails the load.
    pub fn new(
        module: Box<dyn GuestModule>,
        dispatcher: Arc<Dispatcher>,
        max_memory_pages: u32,
    ) -> SandboxResult<Self> {
        let manifest = PluginManifest::from_str(module.manifest_toml())?;
        let grants = manifest.grants();
        let plugin_id = manifest.plugin.id.clone();

        info!(
            plugin = %plugin_id,
            version = %manifest.plugin.version,
            grants = grants.len(),
            "loading plugin module"
        );

        Ok(Self {
            bridge: DispatcherBridge {
                dispatcher,
                grants,
                plugin_id,
            },
            module,
            memory: LinearMemory::new(1, max_memory_pages),
            manifest,
        })
    }

    pub fn id(&self) -> &str {
        &self.manifest.plugin.id
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// One-time module initialization.
    pub fn init(&mut self) -> Result<(), GuestError> {
        self.memory.reset();
        let mut client = BridgeClient::new(&mut self.memory, &self.bridge);
        self.module.init(&mut client)
    }

    /// Invoke a named entry point with a JSON payload.
    pub fn call(&mut self, entry: &str, input: &[u8]) -> Result<Vec<u8>, GuestError> {
        self.memory.reset();
        let mut client = BridgeClient::new(&mut self.memory, &self.bridge);
        self.module.handle_call(&mut client, entry, input)
    }

    /// Host-driven periodic tick.
    pub fn tick(&mut self) -> Result<(), GuestError> {
        self.memory.reset();
        let mut client = BridgeClient::new(&mut self.memory, &self.bridge);
        self.module.on_tick(&mut client)
    }
}
