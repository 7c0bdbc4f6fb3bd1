//! Marshalling across the trust boundary.
//!
//! Both directions copy. Copy-out because the guest can resize (and thereby
//! relocate) its memory at any time, so a borrowed view could dangle;
//! copy-in because the response must live in memory the guest owns and can
//! address. The host validates every handle here and trusts nothing about
//! the length the guest claims.

use crate::error::SandboxResult;
use crate::memory::LinearMemory;
use tessera_bridge_core::MemoryHandle;

/// Copy the bytes a handle describes out of guest memory.
///
/// Fails with `OutOfBounds` when the range runs outside the guest's current
/// memory; the dispatcher aborts the invocation without running any handler.
pub fn read_buffer(mem: &LinearMemory, handle: MemoryHandle) -> SandboxResult<Vec<u8>> {
    mem.read(handle)
}

/// Allocate space inside the guest via its `alloc` export, copy `bytes` in,
/// and return the resulting handle.
///
/// Fails with `AllocationFailed` when the guest allocator is exhausted.
pub fn write_buffer(mem: &mut LinearMemory, bytes: &[u8]) -> SandboxResult<MemoryHandle> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        crate::error::SandboxError::AllocationFailed(format!(
            "buffer of {} bytes does not fit a 32-bit length",
            bytes.len()
        ))
    })?;
    let offset = mem.alloc(len)?;
    mem.write(offset, bytes)?;
    Ok(MemoryHandle::new(offset, len))
}
