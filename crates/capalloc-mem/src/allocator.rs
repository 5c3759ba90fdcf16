//! The accounting allocator.
//!
//! Invariants:
//! - `used` equals the sum of `size + HEADER_SIZE` over all live blocks.
//! - `used <= ceiling` after every operation.
//! - Every failure path leaves `used` (and any existing block) untouched.

use std::ptr::NonNull;

use capalloc_core::config::{AllocatorConfig, MIB};

use crate::error::{AllocError, AllocResult, Request};
use crate::header::{
    accounted, read_size, to_header, to_payload, write_size, BlockHeader, HEADER_SIZE,
};
use crate::platform::{LibcAlloc, PlatformAlloc};
use crate::stats::UsageStats;

pub struct AccountingAllocator<P: PlatformAlloc = LibcAlloc> {
    ceiling: usize,
    used: usize,
    stats: UsageStats,
    platform: P,
}

impl AccountingAllocator<LibcAlloc> {
    pub fn new(ceiling_bytes: usize) -> Self {
        Self::with_platform(ceiling_bytes, LibcAlloc)
    }

    pub fn from_config(cfg: &AllocatorConfig) -> Self {
        Self::new(cfg.max_allocation_bytes)
    }
}

impl<P: PlatformAlloc> AccountingAllocator<P> {
    pub fn with_platform(ceiling_bytes: usize, platform: P) -> Self {
        Self {
            ceiling: ceiling_bytes,
            used: 0,
            stats: UsageStats::default(),
            platform,
        }
    }

    /// Bytes currently attributed to live blocks, headers included.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn ceiling_bytes(&self) -> usize {
        self.ceiling
    }

    pub fn peak_bytes(&self) -> usize {
        self.stats.peak_bytes
    }

    pub fn stats(&self) -> UsageStats {
        self.stats
    }

    /// Zero the counter and statistics at the start of a processing run.
    ///
    /// Blocks still live from an earlier run may be released afterwards; the
    /// counter floors at zero instead of going negative.
    pub fn reset_usage(&mut self) {
        self.used = 0;
        self.stats = UsageStats::default();
    }

    /// Hand out a block of `size` bytes.
    pub fn allocate(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        let result = self.allocate_inner(size);
        match &result {
            Ok(_) => {
                self.stats.allocations += 1;
                self.stats.record_used(self.used);
            }
            Err(err) => self.stats.record_refusal(err),
        }
        result
    }

    fn allocate_inner(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }
        let total = accounted(size).ok_or(AllocError::Overflow { requested: size })?;
        if total > self.headroom() {
            return Err(self.limit_reached(Request::Allocation { total }));
        }

        let base: NonNull<BlockHeader> = NonNull::new(self.platform.alloc(total))
            .ok_or(AllocError::Upstream { bytes: total })?
            .cast();
        // SAFETY: `base` is valid for `total >= HEADER_SIZE` bytes.
        let payload = unsafe {
            write_size(base, size);
            to_payload(base)
        };
        self.used += total;
        Ok(payload)
    }

    /// Resize the block at `ptr` to `size` bytes.
    ///
    /// A null `ptr` behaves like [`allocate`](Self::allocate). A zero `size`
    /// releases the block and returns `Ok(None)`. On any error the original
    /// block stays live and unchanged.
    ///
    /// # Safety
    ///
    /// `ptr` must be null, numerically below `HEADER_SIZE`, or a live pointer
    /// returned by this allocator.
    pub unsafe fn reallocate(
        &mut self,
        ptr: *mut u8,
        size: usize,
    ) -> AllocResult<Option<NonNull<u8>>> {
        let Some(payload) = NonNull::new(ptr) else {
            return self.allocate(size).map(Some);
        };

        let result = unsafe { self.reallocate_inner(payload, size) };
        match &result {
            Ok(Some(_)) => {
                self.stats.reallocations += 1;
                self.stats.record_used(self.used);
            }
            // Counted by `release`.
            Ok(None) => {}
            Err(err) => self.stats.record_refusal(err),
        }
        result
    }

    unsafe fn reallocate_inner(
        &mut self,
        payload: NonNull<u8>,
        size: usize,
    ) -> AllocResult<Option<NonNull<u8>>> {
        let addr = payload.as_ptr() as usize;
        if addr < HEADER_SIZE {
            return Err(AllocError::InvalidPointer { addr });
        }
        if size == 0 {
            unsafe { self.release(payload.as_ptr()) };
            return Ok(None);
        }
        let new_total = accounted(size).ok_or(AllocError::Overflow { requested: size })?;

        let header = unsafe { to_header(payload) };
        let old_size = unsafe { read_size(header) };
        let old_total = old_size.saturating_add(HEADER_SIZE);

        // Net-change check: the block's current contribution is handed back
        // before comparing, so shrinking near the ceiling always fits.
        if new_total > self.headroom().saturating_add(old_total) {
            return Err(self.limit_reached(Request::Reallocation {
                old_total,
                new_total,
            }));
        }

        let base = unsafe { self.platform.realloc(header.as_ptr().cast(), new_total) };
        let base: NonNull<BlockHeader> = NonNull::new(base)
            .ok_or(AllocError::Upstream { bytes: new_total })?
            .cast();

        self.used = self.used.saturating_sub(old_total);
        // SAFETY: `base` is valid for `new_total >= HEADER_SIZE` bytes.
        let payload = unsafe {
            write_size(base, size);
            to_payload(base)
        };
        self.used += new_total;
        Ok(Some(payload))
    }

    /// Return a block to the platform allocator.
    ///
    /// Null and pointers numerically below `HEADER_SIZE` are ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must otherwise be a live pointer returned by this allocator.
    /// Releasing the same pointer twice is undefined behaviour.
    pub unsafe fn release(&mut self, ptr: *mut u8) {
        let Some(payload) = NonNull::new(ptr) else {
            return;
        };
        if (ptr as usize) < HEADER_SIZE {
            return;
        }

        let header = unsafe { to_header(payload) };
        let total = unsafe { read_size(header) }.saturating_add(HEADER_SIZE);
        if total > self.used {
            // Block outlived a `reset_usage`; the counter floors at zero.
            tracing::warn!(bytes = total, used = self.used, "release exceeds live usage");
        }
        self.used = self.used.saturating_sub(total);
        unsafe { self.platform.free(header.as_ptr().cast()) };
        self.stats.releases += 1;
    }

    /// Bytes still available under the ceiling.
    fn headroom(&self) -> usize {
        self.ceiling.saturating_sub(self.used)
    }

    fn limit_reached(&self, request: Request) -> AllocError {
        let limit_mb = self.ceiling / MIB;
        let used_mb = self.used / MIB;
        match request {
            Request::Allocation { total } => {
                tracing::warn!(limit_mb, used_mb, allocation = total, "limit reached");
            }
            Request::Reallocation {
                old_total,
                new_total,
            } => {
                tracing::warn!(
                    limit_mb,
                    used_mb,
                    old = old_total,
                    new = new_total,
                    "limit reached"
                );
            }
        }
        AllocError::CeilingExceeded {
            request,
            used: self.used,
            ceiling: self.ceiling,
        }
    }
}
