//! Accounting allocator tests

use capalloc_mem::header::recorded_size;
use capalloc_mem::{
    AccountingAllocator, AllocError, LibcAlloc, LimitedAlloc, Request, SharedAllocator,
    HEADER_SIZE,
};
use std::ptr::NonNull;
use std::sync::Arc;
use std::thread;

#[test]
fn test_ceiling_end_to_end() {
    let mut alloc = AccountingAllocator::new(1024);
    assert_eq!(HEADER_SIZE, 16);

    // 1000 + 16 fits
    let first = alloc.allocate(1000).expect("First allocate failed");
    assert_eq!(alloc.used_bytes(), 1016);

    // 1016 + 116 = 1132 > 1024
    let result = alloc.allocate(100);
    assert!(matches!(result, Err(AllocError::CeilingExceeded { .. })));
    assert_eq!(alloc.used_bytes(), 1016);

    unsafe { alloc.release(first.as_ptr()) };
    assert_eq!(alloc.used_bytes(), 0);

    let second = alloc.allocate(100).expect("Allocate after release failed");
    assert_eq!(alloc.used_bytes(), 116);
    unsafe { alloc.release(second.as_ptr()) };
    assert_eq!(alloc.used_bytes(), 0);
}

#[test]
fn test_refused_requests_leave_counter_unchanged() {
    let mut alloc = AccountingAllocator::new(4096);
    let held = alloc.allocate(1000).expect("alloc");
    let before = alloc.used_bytes();

    assert_eq!(alloc.allocate(0), Err(AllocError::ZeroSize));
    assert!(matches!(
        alloc.allocate(usize::MAX),
        Err(AllocError::Overflow { .. })
    ));
    assert!(matches!(
        alloc.allocate(4096),
        Err(AllocError::CeilingExceeded { .. })
    ));
    assert_eq!(alloc.used_bytes(), before);

    unsafe { alloc.release(held.as_ptr()) };
    assert_eq!(alloc.stats().refusals(), 3);
}

#[test]
fn test_counter_matches_live_blocks() {
    // Deterministic pseudo-random walk of allocate/reallocate/release.
    let mut alloc = AccountingAllocator::new(256 * 1024);
    let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
    let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut next = || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    for _ in 0..2000 {
        let roll = next();
        let size = (next() % 8192) as usize + 1;
        match roll % 3 {
            0 => {
                if let Ok(p) = alloc.allocate(size) {
                    live.push((p, size));
                }
            }
            1 if !live.is_empty() => {
                let idx = (next() as usize) % live.len();
                let (p, _) = live[idx];
                if let Ok(Some(q)) = unsafe { alloc.reallocate(p.as_ptr(), size) } {
                    live[idx] = (q, size);
                }
            }
            _ if !live.is_empty() => {
                let idx = (next() as usize) % live.len();
                let (p, _) = live.swap_remove(idx);
                unsafe { alloc.release(p.as_ptr()) };
            }
            _ => {}
        }

        let expected: usize = live.iter().map(|(_, size)| size + HEADER_SIZE).sum();
        assert_eq!(alloc.used_bytes(), expected);
        assert!(alloc.used_bytes() <= alloc.ceiling_bytes());
    }

    for (p, size) in live.drain(..) {
        assert_eq!(unsafe { recorded_size(p) }, size);
        unsafe { alloc.release(p.as_ptr()) };
    }
    assert_eq!(alloc.used_bytes(), 0);
}

#[test]
fn test_reallocate_to_zero_releases() {
    let mut alloc = AccountingAllocator::new(1024);
    let p = alloc.allocate(200).expect("alloc");
    assert_eq!(alloc.used_bytes(), 216);

    let out = unsafe { alloc.reallocate(p.as_ptr(), 0) }.expect("release path");
    assert!(out.is_none());
    assert_eq!(alloc.used_bytes(), 0);
}

#[test]
fn test_shrink_decreases_by_difference() {
    let mut alloc = AccountingAllocator::new(1024);
    let p = alloc.allocate(900).expect("alloc");
    let q = unsafe { alloc.reallocate(p.as_ptr(), 250) }
        .expect("shrink")
        .expect("non-null");
    assert_eq!(alloc.used_bytes(), 250 + HEADER_SIZE);
    unsafe { alloc.release(q.as_ptr()) };
}

#[test]
fn test_resize_uses_net_change_against_ceiling() {
    let mut alloc = AccountingAllocator::new(1024);
    let a = alloc.allocate(500).expect("a"); // 516
    let b = alloc.allocate(400).expect("b"); // 416, total 932

    // b can grow by the 92 bytes of headroom, no more.
    let b = unsafe { alloc.reallocate(b.as_ptr(), 492) }
        .expect("grow into headroom")
        .expect("non-null");
    assert_eq!(alloc.used_bytes(), 1024);

    let err = unsafe { alloc.reallocate(b.as_ptr(), 493) }.expect_err("one byte too many");
    assert_eq!(
        err,
        AllocError::CeilingExceeded {
            request: Request::Reallocation {
                old_total: 508,
                new_total: 509,
            },
            used: 1024,
            ceiling: 1024,
        }
    );

    // Shrinking at the ceiling is always accepted.
    let a = unsafe { alloc.reallocate(a.as_ptr(), 100) }
        .expect("shrink at ceiling")
        .expect("non-null");
    assert_eq!(alloc.used_bytes(), 1024 - 400);

    unsafe {
        alloc.release(a.as_ptr());
        alloc.release(b.as_ptr());
    }
    assert_eq!(alloc.used_bytes(), 0);
}

#[test]
fn test_low_pointer_rejected_without_dereference() {
    let mut alloc = AccountingAllocator::new(1024);
    let bogus = 8 as *mut u8;
    assert_eq!(
        unsafe { alloc.reallocate(bogus, 64) },
        Err(AllocError::InvalidPointer { addr: 8 })
    );
    unsafe { alloc.release(bogus) };
    assert_eq!(alloc.used_bytes(), 0);
}

#[test]
fn test_upstream_failure_is_not_counted() {
    let platform = LimitedAlloc::new(LibcAlloc, 4096);
    let mut alloc = AccountingAllocator::with_platform(1 << 20, platform);
    assert_eq!(
        alloc.allocate(8192),
        Err(AllocError::Upstream {
            bytes: 8192 + HEADER_SIZE
        })
    );
    assert_eq!(alloc.used_bytes(), 0);
    assert_eq!(alloc.stats().upstream_failures, 1);
}

#[test]
fn test_payloads_are_sixteen_byte_aligned() {
    let mut alloc = AccountingAllocator::new(1 << 20);
    let blocks: Vec<_> = (1..64)
        .map(|n| alloc.allocate(n * 7).expect("alloc"))
        .collect();
    for p in &blocks {
        assert_eq!(p.as_ptr() as usize % 16, 0);
    }
    for p in blocks {
        unsafe { alloc.release(p.as_ptr()) };
    }
}

#[test]
fn test_shared_allocator_concurrent_access() {
    let shared = Arc::new(SharedAllocator::new(128 * 1024));
    let mut handles = vec![];

    for i in 0..10 {
        let alloc = Arc::clone(&shared);
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                if let Ok(p) = alloc.allocate(1024 * (i + 1)) {
                    unsafe { alloc.release(p.as_ptr()) };
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(shared.used_bytes(), 0);
    assert!(shared.stats().peak_bytes <= shared.ceiling_bytes());
}
