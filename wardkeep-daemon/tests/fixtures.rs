//! Test fixtures for integration tests.
//!
//! Provides a fully wired bridge (in-memory store, complete capability
//! table, dispatcher) plus a raw caller that behaves like a plugin with
//! every capability granted - useful for asserting exact envelope shapes.

use std::sync::Arc;

use serde_json::Value;
use tessera_bridge_core::{CapabilityGrants, Envelope, MemoryHandle};
use tessera_guest::{BridgeClient, HostBridge};
use tessera_host::{CapabilityRegistry, Dispatcher};
use tessera_sandbox::LinearMemory;

use wardkeep_daemon::handlers;
use wardkeep_daemon::store::{SqliteStore, Store};

/// Build the full capability bridge over a fresh in-memory store.
pub fn test_bridge() -> (Arc<Dispatcher>, Arc<dyn Store>) {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let mut registry = CapabilityRegistry::new();
    handlers::register_all(&mut registry, Arc::clone(&store)).unwrap();
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));
    (dispatcher, store)
}

/// Dispatcher adapter granting everything, posing as `test-harness`.
pub struct AllGrantsBridge {
    dispatcher: Arc<Dispatcher>,
    grants: CapabilityGrants,
}

impl HostBridge for AllGrantsBridge {
    fn invoke(&self, mem: &mut LinearMemory, name: MemoryHandle, request: MemoryHandle) -> u64 {
        self.dispatcher
            .dispatch(mem, &self.grants, "test-harness", name, request)
    }
}

/// A raw caller with its own guest memory and full grants.
pub struct RawCaller {
    mem: LinearMemory,
    bridge: AllGrantsBridge,
}

impl RawCaller {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            mem: LinearMemory::new(1, 16),
            bridge: AllGrantsBridge {
                dispatcher,
                grants: CapabilityGrants::all(),
            },
        }
    }

    /// Invoke a capability by wire name and return the whole envelope.
    pub fn call(&mut self, name: &str, payload: Value) -> Envelope {
        let bytes = serde_json::to_vec(&payload).unwrap();
        let mut client = BridgeClient::new(&mut self.mem, &self.bridge);
        client.call_envelope(name, &bytes).unwrap()
    }
}
