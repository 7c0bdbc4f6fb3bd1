//! The capability dispatcher.
//!
//! One synchronous request/response pass per plugin-initiated call:
//!
//! ```text
//! Idle -> ReceivingRequest -> Resolving -> Executing -> SendingResponse -> Idle
//! ```
//!
//! A failure in any phase short-circuits to `SendingResponse` with an error
//! envelope; there is no retry state. Boundary errors are decided here and
//! never reach handler code; domain errors are decided in handlers and pass
//! through untouched; panics and deadline overruns are caught at the
//! handler boundary and downgraded to responses, so no host fault ever
//! unwinds across the sandbox call.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, trace, warn};

use tessera_bridge_core::{
    CapabilityGrants, CapabilityId, Envelope, ErrorKind, MemoryHandle, DELIVERY_FAILED,
};
use tessera_sandbox::{marshal, LinearMemory, SandboxError};

use crate::registry::{CallContext, CapabilityRegistry};
use crate::watchdog;

/// Phase of the per-call state machine, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ReceivingRequest,
    Resolving,
    Executing,
    SendingResponse,
}

/// The synchronous capability dispatcher.
///
/// Shared across plugin sandboxes via `Arc`; holds the immutable registry
/// and the optional handler deadline. Per-caller FIFO ordering falls out of
/// the synchronous call-and-return; cross-caller ordering is serialized only
/// at shared resources inside handlers.
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    handler_deadline: Option<Duration>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            handler_deadline: None,
        }
    }

    /// Bound handler execution time; an overrun produces a `timeout`
    /// envelope instead of wedging the calling plugin thread.
    pub fn with_handler_deadline(mut self, deadline: Duration) -> Self {
        self.handler_deadline = Some(deadline);
        self
    }

    /// Execute one invocation against the calling guest's memory and return
    /// the packed response handle ([`DELIVERY_FAILED`] only when even an
    /// error envelope could not be written).
    pub fn dispatch(
        &self,
        mem: &mut LinearMemory,
        grants: &CapabilityGrants,
        plugin_id: &str,
        name: MemoryHandle,
        request: MemoryHandle,
    ) -> u64 {
        let envelope = self.run_call(mem, grants, plugin_id, name, request);
        self.send_response(mem, plugin_id, envelope)
    }

    /// Phases `ReceivingRequest` through `Executing`; always yields an
    /// envelope.
    fn run_call(
        &self,
        mem: &LinearMemory,
        grants: &CapabilityGrants,
        plugin_id: &str,
        name: MemoryHandle,
        request: MemoryHandle,
    ) -> Envelope {
        trace!(plugin = %plugin_id, phase = ?Phase::ReceivingRequest, "bridge call");

        let name_bytes = match marshal::read_buffer(mem, name) {
            Ok(bytes) => bytes,
            Err(e) => return boundary_failure(plugin_id, e),
        };
        let capability_name = match String::from_utf8(name_bytes) {
            Ok(s) => s,
            Err(_) => {
                return Envelope::fail(
                    ErrorKind::InvalidPayload,
                    "capability name is not valid UTF-8",
                )
            }
        };
        let request_bytes = match marshal::read_buffer(mem, request) {
            Ok(bytes) => bytes,
            Err(e) => return boundary_failure(plugin_id, e),
        };

        trace!(plugin = %plugin_id, capability = %capability_name, phase = ?Phase::Resolving, "bridge call");

        let Some(id) = CapabilityId::parse(&capability_name) else {
            debug!(plugin = %plugin_id, capability = %capability_name, "unknown capability");
            return Envelope::fail(
                ErrorKind::CapabilityNotFound,
                format!("unknown capability: {capability_name}"),
            );
        };

        if !grants.allows(id) {
            debug!(plugin = %plugin_id, capability = %id, "capability not granted");
            return Envelope::fail(
                ErrorKind::CapabilityDenied,
                format!("capability not granted: {id}"),
            );
        }

        let Some(handler) = self.registry.resolve(id) else {
            warn!(plugin = %plugin_id, capability = %id, "capability not registered");
            return Envelope::fail(
                ErrorKind::CapabilityNotFound,
                format!("capability not registered: {id}"),
            );
        };

        let payload: Value = match serde_json::from_slice(&request_bytes) {
            Ok(v) => v,
            Err(e) => {
                return Envelope::fail(ErrorKind::InvalidPayload, format!("invalid JSON: {e}"))
            }
        };
        if !payload.is_object() {
            return Envelope::fail(
                ErrorKind::InvalidPayload,
                "request payload must be a JSON object",
            );
        }

        trace!(plugin = %plugin_id, capability = %id, phase = ?Phase::Executing, "bridge call");

        let ctx = CallContext::new(plugin_id);
        let deadline = self.handler_deadline;
        let outcome = watchdog::run_with_deadline(deadline, move || {
            catch_unwind(AssertUnwindSafe(|| handler.call(&ctx, payload)))
        });

        match outcome {
            Err(watchdog::DeadlineExceeded) => {
                warn!(plugin = %plugin_id, capability = %id, "handler deadline exceeded");
                Envelope::fail(
                    ErrorKind::Timeout,
                    format!("handler exceeded {}ms deadline", deadline.unwrap_or_default().as_millis()),
                )
            }
            Ok(Err(panic)) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "opaque panic".to_string());
                error!(plugin = %plugin_id, capability = %id, %detail, "handler panicked");
                Envelope::fail(ErrorKind::Internal, "internal error")
            }
            Ok(Ok(Err(domain))) => {
                debug!(plugin = %plugin_id, capability = %id, kind = ?domain.kind, "domain failure");
                Envelope::from(domain)
            }
            Ok(Ok(Ok(data))) => Envelope::ok(data),
        }
    }

    /// Phase `SendingResponse`: serialize the envelope into guest memory.
    /// Falls back to a minimal `allocation_failed` envelope when the guest
    /// heap cannot hold the real one, and to [`DELIVERY_FAILED`] when it
    /// cannot hold anything.
    fn send_response(&self, mem: &mut LinearMemory, plugin_id: &str, envelope: Envelope) -> u64 {
        trace!(plugin = %plugin_id, phase = ?Phase::SendingResponse, success = envelope.success, "bridge call");

        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(plugin = %plugin_id, %e, "response serialization failed");
                match Envelope::fail(ErrorKind::Internal, "internal error").to_bytes() {
                    Ok(fallback) => fallback,
                    Err(_) => return DELIVERY_FAILED,
                }
            }
        };

        match marshal::write_buffer(mem, &bytes) {
            Ok(handle) => handle.pack(),
            Err(e) => {
                warn!(plugin = %plugin_id, %e, "response did not fit in guest memory");
                let minimal = Envelope::fail(
                    ErrorKind::AllocationFailed,
                    "response allocation failed",
                );
                match minimal
                    .to_bytes()
                    .ok()
                    .and_then(|b| marshal::write_buffer(mem, &b).ok())
                {
                    Some(handle) => handle.pack(),
                    None => DELIVERY_FAILED,
                }
            }
        }
    }
}

fn boundary_failure(plugin_id: &str, err: SandboxError) -> Envelope {
    debug!(plugin = %plugin_id, %err, "boundary violation");
    let kind = match err {
        SandboxError::OutOfBounds { .. } => ErrorKind::OutOfBounds,
        SandboxError::AllocationFailed(_) => ErrorKind::AllocationFailed,
        _ => ErrorKind::Internal,
    };
    Envelope::fail(kind, err.to_string())
}
