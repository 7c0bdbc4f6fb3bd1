//! # tessera-host
//!
//! Host side of the Tessera capability bridge.
//!
//! This crate provides:
//! - [`CapabilityRegistry`] - the fixed name-to-handler table built once at
//!   host startup
//! - [`Dispatcher`] - the synchronous per-call state machine that marshals a
//!   request out of guest memory, runs the handler, and marshals the
//!   response back in
//! - A watchdog that bounds handler execution time
//!
//! ## Failure discipline
//!
//! The dispatcher never lets a host-side fault unwind across the sandbox
//! call boundary: every invocation - including ones that violate the
//! contract - produces a well-formed response envelope in guest memory, or
//! the reserved `DELIVERY_FAILED` return when even that cannot be allocated.

pub mod dispatch;
pub mod registry;
pub mod watchdog;

pub use dispatch::Dispatcher;
pub use registry::{typed, CallContext, CapabilityRegistry, Handler, HostError};
