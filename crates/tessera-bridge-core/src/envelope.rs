//! The response envelope.
//!
//! Every invocation is answered by exactly one [`Envelope`]:
//!
//! ```json
//! { "success": true,  "data": { ... } }
//! { "success": false, "error": { "kind": "conflict", "message": "email already exists" } }
//! ```
//!
//! `data` is present iff the call succeeded; a success may still carry
//! `data: null` (e.g. a lookup that found nothing - absence is a valid
//! result, not an error). `error` pairs a machine-checkable [`ErrorKind`]
//! with a human-readable message so callers branch on the tag and log the
//! text.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Machine-checkable error tag carried in the envelope.
///
/// Bridge-contract kinds mean the caller used the bridge incorrectly (or the
/// call was cut off); domain kinds are ordinary outcomes of a correctly
/// dispatched handler that the caller is expected to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Handle range runs outside guest memory.
    OutOfBounds,
    /// Guest allocator could not satisfy a response buffer.
    AllocationFailed,
    /// Request bytes are not valid JSON for the capability's schema.
    InvalidPayload,
    /// Capability name unknown or not registered.
    CapabilityNotFound,
    /// Capability known but not granted to this plugin.
    CapabilityDenied,
    /// Handler exceeded the host's execution deadline.
    Timeout,
    /// Unexpected host-side fault, downgraded to a response.
    Internal,
    /// Uniqueness or state conflict (e.g. email already exists).
    Conflict,
    /// Referenced row does not exist.
    NotFound,
    /// Request was well-formed JSON but semantically invalid.
    InvalidInput,
}

impl ErrorKind {
    /// True for kinds decided by the bridge itself rather than handler code.
    /// Timeouts are raised outside the handler and count as bridge-level.
    pub fn is_bridge_contract(&self) -> bool {
        matches!(
            self,
            ErrorKind::OutOfBounds
                | ErrorKind::AllocationFailed
                | ErrorKind::InvalidPayload
                | ErrorKind::CapabilityNotFound
                | ErrorKind::CapabilityDenied
                | ErrorKind::Timeout
        )
    }
}

/// Structured failure body: tag plus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// The discriminated result of one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,

    /// Present iff `success`. `Some(Value::Null)` serializes as `data: null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    /// Successful response carrying `data` (which may be `Value::Null`).
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failure response with a kind and message.
    pub fn fail(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Serialize for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse from wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl From<DomainError> for Envelope {
    fn from(err: DomainError) -> Self {
        Envelope::fail(err.kind, err.message)
    }
}

/// A handler-decided failure: an expected, caller-recoverable outcome.
///
/// Handlers return these instead of bridge errors; the dispatcher folds them
/// into the envelope unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainError {
    pub kind: ErrorKind,
    pub message: String,
}

impl DomainError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Conflict,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            message: message.into(),
        }
    }

    /// Typed-request parse failure inside a handler adapter.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidPayload,
            message: message.into(),
        }
    }

    /// Host fault downgraded to a response. The message stays generic; the
    /// cause goes to the host log, not across the boundary.
    pub fn internal(cause: impl fmt::Display) -> Self {
        tracing::error!(%cause, "handler internal error");
        Self {
            kind: ErrorKind::Internal,
            message: "internal error".to_string(),
        }
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for DomainError {}
