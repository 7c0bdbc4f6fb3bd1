//! Error types for the sandbox substrate.

use thiserror::Error;

/// Errors that can occur in the sandbox layer.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// A handle's range runs outside guest memory.
    #[error("out of bounds: range {offset}+{len} exceeds memory size {size}")]
    OutOfBounds { offset: u32, len: u32, size: usize },

    /// The guest allocator could not satisfy a request.
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    /// Failed to parse a plugin manifest.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// A manifest granted a capability that does not exist.
    #[error(transparent)]
    UnknownCapability(#[from] tessera_bridge_core::UnknownCapability),

    /// Plugin not found at the specified path.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
