//! # tessera-guest
//!
//! Guest side of the Tessera capability bridge.
//!
//! Plugin authors implement [`GuestModule`] and talk to the host through
//! [`BridgeClient`], which hides the buffer juggling: it serializes a
//! request into the module's own linear memory, invokes the imported bridge
//! function, copies the response back out, and maps the envelope to exactly
//! three outcomes - a typed success, a typed domain failure, or a
//! bridge-level failure meaning the contract was used incorrectly.

pub mod client;
pub mod module;

pub use client::{BridgeCallError, BridgeClient, HostBridge};
pub use module::{GuestError, GuestModule};
