//! `extern "C"` trampolines that let a host library allocate through us.
//!
//! The host sees only null-or-pointer; every [`AllocError`](crate::AllocError)
//! collapses to null here. The `user` slot of the table carries the allocator
//! (or the shared allocator's mutex) back into Rust.

use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::sync::{Mutex, PoisonError};

use capalloc_core::AllocHooks;

use crate::allocator::AccountingAllocator;
use crate::error::AllocResult;
use crate::platform::PlatformAlloc;

impl<P: PlatformAlloc> AccountingAllocator<P> {
    /// Build a hook table bound to this allocator.
    ///
    /// The table holds a raw pointer to `self`: the allocator must not move,
    /// be dropped, or be used through any other path while a host is still
    /// calling the hooks.
    pub fn hooks(&mut self) -> AllocHooks {
        AllocHooks {
            user: (self as *mut Self).cast(),
            malloc: malloc_hook::<P>,
            realloc: realloc_hook::<P>,
            free: free_hook::<P>,
        }
    }
}

fn to_raw(ptr: NonNull<u8>) -> *mut c_void {
    ptr.as_ptr().cast()
}

fn null_on_err(result: AllocResult<Option<NonNull<u8>>>) -> *mut c_void {
    match result {
        Ok(Some(ptr)) => to_raw(ptr),
        Ok(None) | Err(_) => ptr::null_mut(),
    }
}

unsafe fn owner<'a, P: PlatformAlloc>(user: *mut c_void) -> &'a mut AccountingAllocator<P> {
    // SAFETY: `user` was produced by `AccountingAllocator::hooks`.
    unsafe { &mut *user.cast::<AccountingAllocator<P>>() }
}

unsafe extern "C" fn malloc_hook<P: PlatformAlloc>(
    user: *mut c_void,
    size: usize,
) -> *mut c_void {
    let alloc = unsafe { owner::<P>(user) };
    alloc.allocate(size).map_or(ptr::null_mut(), to_raw)
}

unsafe extern "C" fn realloc_hook<P: PlatformAlloc>(
    user: *mut c_void,
    old: *mut c_void,
    size: usize,
) -> *mut c_void {
    let alloc = unsafe { owner::<P>(user) };
    null_on_err(unsafe { alloc.reallocate(old.cast(), size) })
}

unsafe extern "C" fn free_hook<P: PlatformAlloc>(user: *mut c_void, ptr: *mut c_void) {
    let alloc = unsafe { owner::<P>(user) };
    unsafe { alloc.release(ptr.cast()) }
}

// ----- shared (mutex-protected) variants -----

pub(crate) fn shared_hooks<P: PlatformAlloc>(
    inner: *const Mutex<AccountingAllocator<P>>,
) -> AllocHooks {
    AllocHooks {
        user: inner.cast_mut().cast(),
        malloc: shared_malloc_hook::<P>,
        realloc: shared_realloc_hook::<P>,
        free: shared_free_hook::<P>,
    }
}

unsafe fn shared_owner<'a, P: PlatformAlloc>(
    user: *mut c_void,
) -> &'a Mutex<AccountingAllocator<P>> {
    // SAFETY: `user` was produced by `SharedAllocator::hooks` and the caller
    // keeps a clone of the `Arc` alive.
    unsafe { &*user.cast::<Mutex<AccountingAllocator<P>>>() }
}

unsafe extern "C" fn shared_malloc_hook<P: PlatformAlloc>(
    user: *mut c_void,
    size: usize,
) -> *mut c_void {
    let mutex = unsafe { shared_owner::<P>(user) };
    let mut alloc = mutex.lock().unwrap_or_else(PoisonError::into_inner);
    alloc.allocate(size).map_or(ptr::null_mut(), to_raw)
}

unsafe extern "C" fn shared_realloc_hook<P: PlatformAlloc>(
    user: *mut c_void,
    old: *mut c_void,
    size: usize,
) -> *mut c_void {
    let mutex = unsafe { shared_owner::<P>(user) };
    let mut alloc = mutex.lock().unwrap_or_else(PoisonError::into_inner);
    null_on_err(unsafe { alloc.reallocate(old.cast(), size) })
}

unsafe extern "C" fn shared_free_hook<P: PlatformAlloc>(user: *mut c_void, ptr: *mut c_void) {
    let mutex = unsafe { shared_owner::<P>(user) };
    let mut alloc = mutex.lock().unwrap_or_else(PoisonError::into_inner);
    unsafe { alloc.release(ptr.cast()) }
}
