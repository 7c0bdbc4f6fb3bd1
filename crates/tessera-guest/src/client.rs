//! The plugin invocation client.
//!
//! Wraps one bridge call: serialize the request, place it (and the
//! capability name) in the module's own linear memory, invoke the imported
//! bridge function, copy the response envelope back out of that same memory,
//! reclaim the call's buffers, and deserialize. All three buffers (name,
//! request, response) are scoped to the single invocation: the client
//! records the heap watermark before allocating and rewinds to it once the
//! response has been copied out.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use tessera_bridge_core::{
    CapabilityId, Envelope, ErrorKind, MemoryHandle, DELIVERY_FAILED,
};
use tessera_sandbox::{marshal, LinearMemory, SandboxError};

/// The bridge function the host registers as an import into the sandbox.
pub trait HostBridge {
    /// Dispatch one invocation. `name` and `request` live in the calling
    /// module's memory; the returned packed handle names the response buffer
    /// the host wrote back into that memory.
    fn invoke(&self, mem: &mut LinearMemory, name: MemoryHandle, request: MemoryHandle) -> u64;
}

/// What a bridge call can come back as, besides a typed success.
#[derive(Error, Debug)]
pub enum BridgeCallError {
    /// The contract was used incorrectly (bad name, malformed payload,
    /// forged handle) or the call was cut off - bridge-level, not expected
    /// in correct code.
    #[error("bridge failure ({kind:?}): {message}")]
    Bridge { kind: ErrorKind, message: String },

    /// An expected, handler-decided outcome the caller branches on.
    #[error("domain failure ({kind:?}): {message}")]
    Domain { kind: ErrorKind, message: String },

    /// Request or response (de)serialization failed guest-side.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The module's own memory rejected an allocation or read.
    #[error("guest memory error: {0}")]
    Memory(#[from] SandboxError),

    /// The host could not deliver any response at all.
    #[error("bridge returned no response")]
    NoResponse,
}

impl BridgeCallError {
    /// True for handler-decided outcomes (including `internal`).
    pub fn is_domain(&self) -> bool {
        matches!(self, BridgeCallError::Domain { .. })
    }

    /// The envelope error kind, when one came back.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            BridgeCallError::Bridge { kind, .. } | BridgeCallError::Domain { kind, .. } => {
                Some(*kind)
            }
            _ => None,
        }
    }
}

/// Guest-side stub for invoking host capabilities.
///
/// Borrows the module's linear memory and the imported bridge function for
/// the duration of one entry-point call.
pub struct BridgeClient<'a> {
    mem: &'a mut LinearMemory,
    host: &'a dyn HostBridge,
}

impl<'a> BridgeClient<'a> {
    pub fn new(mem: &'a mut LinearMemory, host: &'a dyn HostBridge) -> Self {
        Self { mem, host }
    }

    /// Invoke `capability` with a typed request, decoding the envelope into
    /// a typed response. Lookups that can miss decode into `Option<T>`;
    /// `data: null` becomes `None`.
    pub fn call<Req, Resp>(
        &mut self,
        capability: CapabilityId,
        request: &Req,
    ) -> Result<Resp, BridgeCallError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(request)?;
        let envelope = self.call_envelope(capability.as_str(), &payload)?;

        if envelope.success {
            let data = envelope.data.unwrap_or(Value::Null);
            Ok(serde_json::from_value(data)?)
        } else {
            let err = envelope.error.unwrap_or(tessera_bridge_core::ErrorBody {
                kind: ErrorKind::Internal,
                message: "malformed envelope: failure without error body".to_string(),
            });
            if err.kind.is_bridge_contract() {
                Err(BridgeCallError::Bridge {
                    kind: err.kind,
                    message: err.message,
                })
            } else {
                Err(BridgeCallError::Domain {
                    kind: err.kind,
                    message: err.message,
                })
            }
        }
    }

    /// Raw variant used by tests and by callers with unusual payloads: takes
    /// the capability name as a string and returns the whole envelope.
    pub fn call_envelope(
        &mut self,
        name: &str,
        payload: &[u8],
    ) -> Result<Envelope, BridgeCallError> {
        let mark = self.mem.mark();

        let result = self.call_envelope_inner(name, payload);

        // Name, request and response buffers all die with the call.
        self.mem.reset_to(mark);
        result
    }

    fn call_envelope_inner(
        &mut self,
        name: &str,
        payload: &[u8],
    ) -> Result<Envelope, BridgeCallError> {
        let name_handle = marshal::write_buffer(self.mem, name.as_bytes())?;
        let request_handle = marshal::write_buffer(self.mem, payload)?;

        let raw = self.host.invoke(self.mem, name_handle, request_handle);
        if raw == DELIVERY_FAILED {
            return Err(BridgeCallError::NoResponse);
        }

        // The response lives in this module's own memory; copying it out
        // needs no boundary crossing.
        let response = MemoryHandle::unpack(raw);
        let bytes = self.mem.read(response)?;
        Ok(Envelope::from_bytes(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    /// Fake host: records the last call it saw and plays back a canned
    /// envelope.
    struct CannedHost {
        envelope: Envelope,
    }

    impl HostBridge for CannedHost {
        fn invoke(
            &self,
            mem: &mut LinearMemory,
            _name: MemoryHandle,
            _request: MemoryHandle,
        ) -> u64 {
            let bytes = self.envelope.to_bytes().unwrap();
            marshal::write_buffer(mem, &bytes).unwrap().pack()
        }
    }

    /// Host that checks what arrived in guest memory before answering.
    struct EchoHost;

    impl HostBridge for EchoHost {
        fn invoke(
            &self,
            mem: &mut LinearMemory,
            name: MemoryHandle,
            request: MemoryHandle,
        ) -> u64 {
            let name = String::from_utf8(mem.read(name).unwrap()).unwrap();
            let payload: Value = serde_json::from_slice(&mem.read(request).unwrap()).unwrap();
            let envelope = Envelope::ok(json!({ "capability": name, "payload": payload }));
            marshal::write_buffer(mem, &envelope.to_bytes().unwrap())
                .unwrap()
                .pack()
        }
    }

    #[derive(Deserialize, PartialEq, Debug)]
    struct Echoed {
        capability: String,
        payload: Value,
    }

    #[test]
    fn test_call_marshals_name_and_payload() {
        let mut mem = LinearMemory::new(1, 4);
        let host = EchoHost;
        let mut client = BridgeClient::new(&mut mem, &host);

        let echoed: Echoed = client
            .call(CapabilityId::DbGetSession, &json!({"session_id": "s-1"}))
            .unwrap();

        assert_eq!(echoed.capability, "db_get_session");
        assert_eq!(echoed.payload, json!({"session_id": "s-1"}));
    }

    #[test]
    fn test_null_data_decodes_to_none() {
        let mut mem = LinearMemory::new(1, 4);
        let host = CannedHost {
            envelope: Envelope::ok(Value::Null),
        };
        let mut client = BridgeClient::new(&mut mem, &host);

        let missing: Option<Echoed> = client
            .call(CapabilityId::DbGetSession, &json!({"session_id": "nope"}))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_domain_failure_is_branchable() {
        let mut mem = LinearMemory::new(1, 4);
        let host = CannedHost {
            envelope: Envelope::fail(ErrorKind::Conflict, "email already exists"),
        };
        let mut client = BridgeClient::new(&mut mem, &host);

        let err = client
            .call::<_, Value>(CapabilityId::DbCreateUser, &json!({}))
            .unwrap_err();
        assert!(err.is_domain());
        assert_eq!(err.kind(), Some(ErrorKind::Conflict));
    }

    #[test]
    fn test_bridge_failure_is_distinguished() {
        let mut mem = LinearMemory::new(1, 4);
        let host = CannedHost {
            envelope: Envelope::fail(ErrorKind::CapabilityDenied, "capability not granted"),
        };
        let mut client = BridgeClient::new(&mut mem, &host);

        let err = client
            .call::<_, Value>(CapabilityId::DbCreateUser, &json!({}))
            .unwrap_err();
        assert!(!err.is_domain());
        assert_eq!(err.kind(), Some(ErrorKind::CapabilityDenied));
    }

    #[test]
    fn test_delivery_failure_surfaces() {
        struct DeadHost;
        impl HostBridge for DeadHost {
            fn invoke(&self, _: &mut LinearMemory, _: MemoryHandle, _: MemoryHandle) -> u64 {
                DELIVERY_FAILED
            }
        }

        let mut mem = LinearMemory::new(1, 4);
        let host = DeadHost;
        let mut client = BridgeClient::new(&mut mem, &host);

        let err = client
            .call::<_, Value>(CapabilityId::SysGetTimestamp, &json!({}))
            .unwrap_err();
        assert!(matches!(err, BridgeCallError::NoResponse));
    }

    #[test]
    fn test_call_buffers_are_reclaimed() {
        let mut mem = LinearMemory::new(1, 4);
        let before = mem.mark();
        {
            let host = EchoHost;
            let mut client = BridgeClient::new(&mut mem, &host);
            for _ in 0..100 {
                let _: Echoed = client
                    .call(CapabilityId::SysGetTimestamp, &json!({"k": "v"}))
                    .unwrap();
            }
        }
        // A hundred calls must not creep the heap upward.
        assert_eq!(mem.mark(), before);
    }
}
