//! # wardkeep-daemon
//!
//! The Wardkeep host daemon.
//!
//! This daemon is responsible for:
//! - Loading sandboxed plugin modules and their capability grants
//! - Serving the capability bridge (registry + dispatcher) those modules
//!   call into
//! - Owning the SQLite store behind the database capabilities
//! - Running the periodic tick loop over tickable plugins
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       wardkeep-daemon                        │
//! │                                                              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐   │
//! │  │ plugin-auth │   │plugin-audit │   │ external plugin  │   │
//! │  │  (sandbox)  │   │  (sandbox)  │   │ manifests (list) │   │
//! │  └──────┬──────┘   └──────┬──────┘   └──────────────────┘   │
//! │         │ bridge imports  │                                 │
//! │  ┌──────▼─────────────────▼──────────────────────────────┐  │
//! │  │      Dispatcher (marshal / grants / watchdog)         │  │
//! │  └──────┬────────────────────────────────────────────────┘  │
//! │  ┌──────▼──────────┐      ┌─────────────────────────────┐   │
//! │  │ Capability      │      │ SQLite store                │   │
//! │  │ registry        ├──────► users · sessions · tokens   │   │
//! │  │ (fixed table)   │      │ audit logs                  │   │
//! │  └─────────────────┘      └─────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//!
//! The daemon reads configuration from
//! `$XDG_CONFIG_HOME/wardkeep/config.toml` and writes a default file on
//! first run.
//!
//! ## Running
//!
//! ```bash
//! # Start the daemon
//! cargo run --bin wardkeep-daemon
//!
//! # With debug logging
//! RUST_LOG=debug cargo run --bin wardkeep-daemon
//! ```

pub mod config;
pub mod handlers;
pub mod plugin;
pub mod sandbox;
pub mod store;
pub mod tick;
