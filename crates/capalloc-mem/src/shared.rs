//! Mutex-protected allocator for several owners on one budget.
//!
//! Each operation holds the lock for its whole read/modify/write sequence,
//! so the counter and headers stay consistent under concurrent callers.

use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use capalloc_core::AllocHooks;

use crate::allocator::AccountingAllocator;
use crate::error::AllocResult;
use crate::hooks::shared_hooks;
use crate::platform::{LibcAlloc, PlatformAlloc};
use crate::stats::UsageStats;

pub struct SharedAllocator<P: PlatformAlloc = LibcAlloc> {
    inner: Arc<Mutex<AccountingAllocator<P>>>,
}

impl<P: PlatformAlloc> Clone for SharedAllocator<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SharedAllocator<LibcAlloc> {
    pub fn new(ceiling_bytes: usize) -> Self {
        Self::from_allocator(AccountingAllocator::new(ceiling_bytes))
    }
}

impl<P: PlatformAlloc> SharedAllocator<P> {
    pub fn from_allocator(allocator: AccountingAllocator<P>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(allocator)),
        }
    }

    // A panic while holding the lock cannot leave the counter half-updated:
    // every mutation completes before anything that could panic.
    fn lock(&self) -> MutexGuard<'_, AccountingAllocator<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>> {
        self.lock().allocate(size)
    }

    /// # Safety
    ///
    /// Same contract as [`AccountingAllocator::reallocate`].
    pub unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        size: usize,
    ) -> AllocResult<Option<NonNull<u8>>> {
        unsafe { self.lock().reallocate(ptr, size) }
    }

    /// # Safety
    ///
    /// Same contract as [`AccountingAllocator::release`].
    pub unsafe fn release(&self, ptr: *mut u8) {
        unsafe { self.lock().release(ptr) }
    }

    pub fn used_bytes(&self) -> usize {
        self.lock().used_bytes()
    }

    pub fn ceiling_bytes(&self) -> usize {
        self.lock().ceiling_bytes()
    }

    pub fn stats(&self) -> UsageStats {
        self.lock().stats()
    }

    pub fn reset_usage(&self) {
        self.lock().reset_usage();
    }

    /// Hook table bound to the shared state. Keep at least one clone of this
    /// `SharedAllocator` alive for as long as the host may call the hooks.
    pub fn hooks(&self) -> AllocHooks {
        shared_hooks(Arc::as_ptr(&self.inner))
    }
}
