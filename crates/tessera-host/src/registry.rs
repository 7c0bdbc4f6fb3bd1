//! The capability registry.
//!
//! The authoritative mapping from capability id to handler. Built once at
//! host startup before any plugin is loaded and immutable afterward: a
//! duplicate registration is fatal to initialization, and the only failure
//! reachable at runtime is a lookup miss.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_bridge_core::{CapabilityId, DomainError};
use thiserror::Error;

/// Errors raised while assembling the host.
#[derive(Error, Debug)]
pub enum HostError {
    /// A capability id was registered twice.
    #[error("duplicate capability: {0}")]
    DuplicateCapability(CapabilityId),
}

/// Per-invocation context handed to handlers.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Id of the plugin making the call, for logging and audit attribution.
    pub plugin_id: String,
}

impl CallContext {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
        }
    }
}

/// A host operation callable from sandboxed code.
///
/// Handlers receive the already-parsed JSON payload and return either the
/// success `data` value or a domain error; they never see marshalling or
/// contract failures, and nothing they return can crash the bridge.
pub trait Handler: Send + Sync {
    fn call(&self, ctx: &CallContext, payload: Value) -> Result<Value, DomainError>;
}

impl<F> Handler for F
where
    F: Fn(&CallContext, Value) -> Result<Value, DomainError> + Send + Sync,
{
    fn call(&self, ctx: &CallContext, payload: Value) -> Result<Value, DomainError> {
        self(ctx, payload)
    }
}

/// Wrap a typed handler function: the request struct is deserialized from
/// the payload per the capability's schema, and a mismatch is reported as
/// `invalid_payload` without invoking the function.
pub fn typed<Req, F>(f: F) -> Arc<dyn Handler>
where
    Req: DeserializeOwned + Send + Sync + 'static,
    F: Fn(&CallContext, Req) -> Result<Value, DomainError> + Send + Sync + 'static,
{
    Arc::new(move |ctx: &CallContext, payload: Value| {
        let req: Req = serde_json::from_value(payload)
            .map_err(|e| DomainError::invalid_payload(format!("invalid request: {e}")))?;
        f(ctx, req)
    })
}

/// Registry mapping capability ids to handlers.
pub struct CapabilityRegistry {
    handlers: HashMap<CapabilityId, Arc<dyn Handler>>,
}

impl CapabilityRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler. Fails if the id is already taken - surfaced at
    /// startup and fatal to host initialization, never at runtime.
    pub fn register(
        &mut self,
        id: CapabilityId,
        handler: Arc<dyn Handler>,
    ) -> Result<(), HostError> {
        if self.handlers.contains_key(&id) {
            return Err(HostError::DuplicateCapability(id));
        }
        self.handlers.insert(id, handler);
        Ok(())
    }

    /// Look up a handler.
    pub fn resolve(&self, id: CapabilityId) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&id).cloned()
    }

    /// Ids with a registered handler.
    pub fn registered_ids(&self) -> Vec<CapabilityId> {
        self.handlers.keys().copied().collect()
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
