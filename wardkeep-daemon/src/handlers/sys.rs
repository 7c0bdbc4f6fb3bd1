//! System utility capabilities: the host clock and host entropy.
//!
//! Sandboxed code has neither; both were imports in the original module ABI
//! and stay capabilities here so grants cover them like everything else.

use chrono::Utc;
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use tessera_bridge_core::DomainError;
use tessera_host::{typed, Handler};

const MAX_RANDOM_BYTES: u32 = 1024;

#[derive(Deserialize)]
struct Empty {}

#[derive(Deserialize)]
struct RandomBytesRequest {
    length: u32,
}

/// `sys_get_timestamp`: current Unix time in seconds.
pub fn get_timestamp() -> Arc<dyn Handler> {
    typed(|_ctx, _req: Empty| Ok(json!({ "epoch_seconds": Utc::now().timestamp() })))
}

/// `sys_random_bytes`: host-sourced random bytes, bounded so a guest cannot
/// request a response bigger than its own memory.
pub fn random_bytes() -> Arc<dyn Handler> {
    typed(|_ctx, req: RandomBytesRequest| {
        if req.length == 0 || req.length > MAX_RANDOM_BYTES {
            return Err(DomainError::invalid_input(format!(
                "length must be between 1 and {MAX_RANDOM_BYTES}"
            )));
        }
        let mut bytes = vec![0u8; req.length as usize];
        rand::thread_rng().fill_bytes(&mut bytes);
        Ok(json!({ "bytes": bytes }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tessera_bridge_core::ErrorKind;
    use tessera_host::CallContext;

    #[test]
    fn test_timestamp_is_plausible() {
        let handler = get_timestamp();
        let out = handler.call(&CallContext::new("t"), json!({})).unwrap();
        let ts = out["epoch_seconds"].as_i64().unwrap();
        // After 2020, before 2100.
        assert!(ts > 1_577_836_800 && ts < 4_102_444_800);
    }

    #[test]
    fn test_random_bytes_length_and_variety() {
        let handler = random_bytes();
        let ctx = CallContext::new("t");

        let a = handler.call(&ctx, json!({ "length": 16 })).unwrap();
        let b = handler.call(&ctx, json!({ "length": 16 })).unwrap();
        assert_eq!(a["bytes"].as_array().unwrap().len(), 16);
        // Two 16-byte draws colliding means the RNG is broken.
        assert_ne!(a, b);
    }

    #[test]
    fn test_random_bytes_bounds() {
        let handler = random_bytes();
        let ctx = CallContext::new("t");

        let zero = handler.call(&ctx, json!({ "length": 0 })).unwrap_err();
        assert_eq!(zero.kind, ErrorKind::InvalidInput);

        let huge = handler
            .call(&ctx, json!({ "length": 1_000_000 }))
            .unwrap_err();
        assert_eq!(huge.kind, ErrorKind::InvalidInput);

        let max: Value = handler
            .call(&ctx, json!({ "length": MAX_RANDOM_BYTES }))
            .unwrap();
        assert_eq!(
            max["bytes"].as_array().unwrap().len(),
            MAX_RANDOM_BYTES as usize
        );
    }
}
