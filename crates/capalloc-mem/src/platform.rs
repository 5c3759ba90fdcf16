//! The underlying platform allocator.
//!
//! The accounting layer only needs `malloc`/`realloc`/`free` semantics: no
//! layout, no size introspection. Sizes are recovered from our own headers.

use libc::c_void;

/// Storage provider behind an [`AccountingAllocator`](crate::AccountingAllocator).
///
/// # Safety
///
/// A non-null pointer returned from `alloc`/`realloc` must be valid for reads
/// and writes of `bytes` bytes and accepted by `realloc`/`free` on the same
/// implementor. `realloc` must preserve the leading `min(old, new)` bytes and
/// leave the original block untouched when it returns null.
pub unsafe trait PlatformAlloc {
    /// Null means the platform could not satisfy the request.
    fn alloc(&mut self, bytes: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must be a live pointer from this allocator.
    unsafe fn realloc(&mut self, ptr: *mut u8, bytes: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must be a live pointer from this allocator.
    unsafe fn free(&mut self, ptr: *mut u8);
}

/// The C runtime's `malloc` family.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcAlloc;

unsafe impl PlatformAlloc for LibcAlloc {
    fn alloc(&mut self, bytes: usize) -> *mut u8 {
        // SAFETY: malloc has no preconditions.
        unsafe { libc::malloc(bytes) as *mut u8 }
    }

    unsafe fn realloc(&mut self, ptr: *mut u8, bytes: usize) -> *mut u8 {
        unsafe { libc::realloc(ptr as *mut c_void, bytes) as *mut u8 }
    }

    unsafe fn free(&mut self, ptr: *mut u8) {
        unsafe { libc::free(ptr as *mut c_void) }
    }
}

/// Wraps another platform allocator and refuses any single request larger
/// than `max_block` bytes, the way a constrained heap would.
#[derive(Debug, Clone, Copy)]
pub struct LimitedAlloc<P = LibcAlloc> {
    inner: P,
    max_block: usize,
}

impl<P: PlatformAlloc> LimitedAlloc<P> {
    pub fn new(inner: P, max_block: usize) -> Self {
        Self { inner, max_block }
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }
}

unsafe impl<P: PlatformAlloc> PlatformAlloc for LimitedAlloc<P> {
    fn alloc(&mut self, bytes: usize) -> *mut u8 {
        if bytes > self.max_block {
            return std::ptr::null_mut();
        }
        self.inner.alloc(bytes)
    }

    unsafe fn realloc(&mut self, ptr: *mut u8, bytes: usize) -> *mut u8 {
        if bytes > self.max_block {
            return std::ptr::null_mut();
        }
        unsafe { self.inner.realloc(ptr, bytes) }
    }

    unsafe fn free(&mut self, ptr: *mut u8) {
        unsafe { self.inner.free(ptr) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn libc_alloc_realloc_preserves_prefix() {
        let mut platform = LibcAlloc;
        unsafe {
            let p = platform.alloc(8);
            assert!(!p.is_null());
            p.copy_from_nonoverlapping(b"abcdefgh".as_ptr(), 8);
            let q = platform.realloc(p, 4096);
            assert!(!q.is_null());
            assert_eq!(std::slice::from_raw_parts(q, 8), b"abcdefgh");
            platform.free(q);
        }
    }

    #[test]
    fn limited_alloc_refuses_oversized_blocks() {
        let mut platform = LimitedAlloc::new(LibcAlloc, 64);
        assert!(platform.alloc(65).is_null());
        let p = platform.alloc(64);
        assert!(!p.is_null());
        unsafe {
            assert!(platform.realloc(p, 128).is_null());
            platform.free(p);
        }
    }
}
