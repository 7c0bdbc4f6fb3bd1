//! The guest module contract.
//!
//! A plugin is a [`GuestModule`]: it carries its manifest, exposes named
//! entry points the host calls with JSON payloads, and may ask to be ticked
//! periodically. Everything a module does against host state goes through
//! the [`BridgeClient`] it is handed per call - modules hold no host
//! resources of their own.

use crate::client::{BridgeCallError, BridgeClient};
use thiserror::Error;

/// Errors a guest module can return to the host.
#[derive(Error, Debug)]
pub enum GuestError {
    /// The host called an entry point the module does not export.
    #[error("unknown entry point: {0}")]
    UnknownEntry(String),

    /// The entry-point input could not be parsed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A bridge call failed in a way the module does not handle.
    #[error(transparent)]
    Bridge(#[from] BridgeCallError),

    /// Entry-point output could not be serialized.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The module itself failed (e.g. a hashing primitive errored).
    #[error("module failure: {0}")]
    Failed(String),
}

/// A sandboxed plugin module.
///
/// Entry points take and return JSON bytes; domain failures the module wants
/// the application to see are part of its own response shape, not
/// `GuestError` (which signals the call itself went wrong).
pub trait GuestModule: Send {
    /// The module's embedded manifest (same TOML as an on-disk
    /// `manifest.toml`).
    fn manifest_toml(&self) -> &'static str;

    /// One-time initialization after load.
    fn init(&mut self, _bridge: &mut BridgeClient<'_>) -> Result<(), GuestError> {
        Ok(())
    }

    /// Invoke a named entry point.
    fn handle_call(
        &mut self,
        bridge: &mut BridgeClient<'_>,
        entry: &str,
        input: &[u8],
    ) -> Result<Vec<u8>, GuestError>;

    /// Periodic host-driven tick; enabled by a `[tick]` table in the
    /// manifest.
    fn on_tick(&mut self, _bridge: &mut BridgeClient<'_>) -> Result<(), GuestError> {
        Ok(())
    }
}
