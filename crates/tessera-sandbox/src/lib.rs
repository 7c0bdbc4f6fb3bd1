//! # tessera-sandbox
//!
//! Sandbox substrate for Wardkeep plugins.
//!
//! This crate provides:
//! - A page-granular linear memory with bounds-checked access and a guest
//!   allocator, modelling the memory a sandboxed module exports to the host
//! - The marshalling layer that copies buffers across the trust boundary
//! - Plugin manifest parsing
//! - Plugin discovery from well-known paths
//!
//! ## Plugin Structure
//!
//! Plugins are directories containing:
//! - `manifest.toml` - Plugin metadata and capability grants
//!
//! Built-in modules embed the same manifest text in their crate.
//!
//! ## Trust Model
//!
//! The host never trusts an offset or length the guest supplies: every
//! access revalidates the full range, and data always crosses the boundary
//! by copy, never by reference.

pub mod discovery;
pub mod error;
pub mod manifest;
pub mod marshal;
pub mod memory;

pub use discovery::{discover_in_directory, discover_plugin, discover_plugins, PluginPath};
pub use error::{SandboxError, SandboxResult};
pub use manifest::{PluginManifest, PluginMetadata, TickConfig};
pub use marshal::{read_buffer, write_buffer};
pub use memory::{LinearMemory, HEAP_BASE, PAGE_SIZE};
