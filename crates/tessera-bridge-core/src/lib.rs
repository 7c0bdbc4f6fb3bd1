//! # tessera-bridge-core
//!
//! Wire contract for the Tessera capability bridge.
//!
//! This crate defines the types both sides of the sandbox boundary agree on:
//!
//! - [`CapabilityId`] - the closed table of host operations a guest may invoke
//! - [`MemoryHandle`] - an (offset, length) descriptor into guest linear memory
//! - [`Envelope`] - the JSON response envelope every invocation produces
//! - [`ErrorKind`] - machine-checkable error tags paired with human messages
//!
//! The host (`tessera-host`) and the guest stub (`tessera-guest`) both depend
//! on this crate and nothing else shared, so the contract cannot drift between
//! the two sides.

pub mod capability;
pub mod envelope;
pub mod handle;

pub use capability::{CapabilityGrants, CapabilityId, UnknownCapability, ALL_CAPABILITIES};
pub use envelope::{DomainError, Envelope, ErrorBody, ErrorKind};
pub use handle::{MemoryHandle, DELIVERY_FAILED};
