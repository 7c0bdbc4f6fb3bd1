//! Guest linear memory.
//!
//! Models the memory a sandboxed module exports to the host: a flat byte
//! array sized in 64 KiB pages that can grow up to a per-plugin ceiling, plus
//! the module's `alloc`/`free` exports. All access is bounds-checked against
//! the current size; ranges are validated in 64-bit arithmetic so
//! `offset + len` cannot wrap.
//!
//! The allocator is a bump allocator: `alloc` advances a watermark, `free`
//! rewinds only when handed the most recent allocation, and `reset`/
//! `reset_to` reclaim everything down to a mark. Buffers are scoped to a
//! single invocation; the module host resets the heap between entry-point
//! calls.

use crate::error::{SandboxError, SandboxResult};
use tessera_bridge_core::MemoryHandle;

/// Size of one memory page (64 KiB, as in any WASM-like linear memory).
pub const PAGE_SIZE: usize = 64 * 1024;

/// First allocatable offset. Keeping the low kilobyte unallocated means no
/// real allocation packs to the reserved `DELIVERY_FAILED` value.
pub const HEAP_BASE: u32 = 1024;

const ALIGN: u32 = 8;

/// A guest's linear memory plus its allocator exports.
pub struct LinearMemory {
    data: Vec<u8>,
    max_pages: u32,
    heap_top: u32,
    last_alloc: Option<MemoryHandle>,
}

impl LinearMemory {
    /// Create a memory of `initial_pages`, growable up to `max_pages`.
    /// Both are clamped to at least one page.
    pub fn new(initial_pages: u32, max_pages: u32) -> Self {
        let initial = initial_pages.max(1);
        let max = max_pages.max(initial);
        Self {
            data: vec![0; initial as usize * PAGE_SIZE],
            max_pages: max,
            heap_top: HEAP_BASE,
            last_alloc: None,
        }
    }

    /// Current size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Current size in pages.
    pub fn pages(&self) -> u32 {
        (self.data.len() / PAGE_SIZE) as u32
    }

    /// Grow by `additional_pages`, failing once the ceiling is reached.
    pub fn grow(&mut self, additional_pages: u32) -> SandboxResult<()> {
        let target = self
            .pages()
            .checked_add(additional_pages)
            .ok_or_else(|| SandboxError::AllocationFailed("page count overflow".into()))?;
        if target > self.max_pages {
            return Err(SandboxError::AllocationFailed(format!(
                "grow to {target} pages exceeds ceiling of {} pages",
                self.max_pages
            )));
        }
        self.data.resize(target as usize * PAGE_SIZE, 0);
        Ok(())
    }

    fn check_range(&self, offset: u32, len: u32) -> SandboxResult<()> {
        let end = u64::from(offset) + u64::from(len);
        if end > self.data.len() as u64 {
            return Err(SandboxError::OutOfBounds {
                offset,
                len,
                size: self.data.len(),
            });
        }
        Ok(())
    }

    /// Copy a range out. Always a copy: the backing store may move on grow.
    pub fn read(&self, handle: MemoryHandle) -> SandboxResult<Vec<u8>> {
        self.check_range(handle.offset, handle.len)?;
        let start = handle.offset as usize;
        Ok(self.data[start..start + handle.len as usize].to_vec())
    }

    /// Copy bytes into an already-valid range.
    pub fn write(&mut self, offset: u32, bytes: &[u8]) -> SandboxResult<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| SandboxError::OutOfBounds {
            offset,
            len: u32::MAX,
            size: self.data.len(),
        })?;
        self.check_range(offset, len)?;
        let start = offset as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// The module's `alloc` export: reserve `len` bytes and return the
    /// offset. Grows memory on demand; fails with `AllocationFailed` at the
    /// page ceiling.
    pub fn alloc(&mut self, len: u32) -> SandboxResult<u32> {
        let offset = self.heap_top;
        let end = u64::from(offset) + u64::from(len);
        if end > u64::from(u32::MAX) {
            return Err(SandboxError::AllocationFailed(format!(
                "allocation of {len} bytes exceeds the 32-bit address space"
            )));
        }
        if end > self.data.len() as u64 {
            let needed = end - self.data.len() as u64;
            let pages = needed.div_ceil(PAGE_SIZE as u64) as u32;
            self.grow(pages)?;
        }
        // Watermark advances past the allocation, re-aligned for the next one.
        let padded = (len.max(1) + (ALIGN - 1)) & !(ALIGN - 1);
        self.heap_top = offset.saturating_add(padded);
        self.last_alloc = Some(MemoryHandle::new(offset, len));
        Ok(offset)
    }

    /// The module's `free` export. Bump semantics: only the most recent
    /// allocation is reclaimed; anything older waits for a heap reset.
    pub fn free(&mut self, handle: MemoryHandle) {
        if self.last_alloc == Some(handle) {
            self.heap_top = handle.offset;
            self.last_alloc = None;
        }
    }

    /// Current heap watermark, for scoped reclamation via
    /// [`reset_to`](Self::reset_to).
    pub fn mark(&self) -> u32 {
        self.heap_top
    }

    /// Rewind the heap to a previously observed mark.
    pub fn reset_to(&mut self, mark: u32) {
        if mark >= HEAP_BASE && mark <= self.heap_top {
            self.heap_top = mark;
            self.last_alloc = None;
        }
    }

    /// Reclaim every allocation. Called by the module host between
    /// entry-point invocations.
    pub fn reset(&mut self) {
        self.heap_top = HEAP_BASE;
        self.last_alloc = None;
    }
}
