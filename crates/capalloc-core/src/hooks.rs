//! C-ABI allocation hook table.
//!
//! A host library that lets callers replace its allocator typically takes a
//! struct of three function pointers plus an opaque context value. This is
//! that struct. The concrete trampolines live in `capalloc-mem`; here we only
//! define the shape so host bindings can depend on it without pulling in the
//! allocator.

use std::ffi::c_void;

/// `malloc(user, size) -> ptr`. Returns null on any failure.
pub type MallocFn = unsafe extern "C" fn(user: *mut c_void, size: usize) -> *mut c_void;

/// `realloc(user, old, size) -> ptr`. Returns null on failure or when `size == 0`.
pub type ReallocFn =
    unsafe extern "C" fn(user: *mut c_void, old: *mut c_void, size: usize) -> *mut c_void;

/// `free(user, ptr)`. Null is a no-op.
pub type FreeFn = unsafe extern "C" fn(user: *mut c_void, ptr: *mut c_void);

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AllocHooks {
    /// Opaque value passed back to every hook.
    pub user: *mut c_void,
    pub malloc: MallocFn,
    pub realloc: ReallocFn,
    pub free: FreeFn,
}

impl AllocHooks {
    /// Request `size` bytes. Null means the request was refused.
    ///
    /// # Safety
    ///
    /// `self.user` must still point at the state the hooks were built for.
    pub unsafe fn alloc(&self, size: usize) -> *mut u8 {
        unsafe { (self.malloc)(self.user, size).cast() }
    }

    /// Resize a block obtained from these hooks (or allocate if `old` is null).
    ///
    /// # Safety
    ///
    /// Same as [`AllocHooks::alloc`]; additionally `old` must be null or a
    /// live pointer previously returned by these hooks.
    pub unsafe fn resize(&self, old: *mut u8, size: usize) -> *mut u8 {
        unsafe { (self.realloc)(self.user, old.cast(), size).cast() }
    }

    /// Return a block to the allocator.
    ///
    /// # Safety
    ///
    /// Same as [`AllocHooks::resize`]; `ptr` must not be used afterwards.
    pub unsafe fn release(&self, ptr: *mut u8) {
        unsafe { (self.free)(self.user, ptr.cast()) }
    }
}
