//! Block header layout.
//!
//! ```text
//!   base (from platform)        payload (returned to caller)
//!   │                           │
//!   ▼                           ▼
//!   ┌───────────────────────────┬──────────────────────────────┐
//!   │ BlockHeader { size }      │ `size` bytes for the caller  │
//!   └───────────────────────────┴──────────────────────────────┘
//!   ◄──────── HEADER_SIZE ──────►
//! ```
//!
//! `to_header` and `to_payload` are the only functions that know the offset.

use std::mem;
use std::ptr::NonNull;

/// Metadata stored immediately before every payload. Aligned to 16 so the
/// payload keeps the platform allocator's alignment guarantee.
#[repr(C, align(16))]
pub struct BlockHeader {
    size: usize,
}

/// Bytes between the start of the underlying storage and the payload.
pub const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

const _: () = assert!(HEADER_SIZE == 16);

/// Accounted size of a block whose caller asked for `size` bytes, or `None`
/// if adding the header would overflow.
#[inline]
pub fn accounted(size: usize) -> Option<usize> {
    size.checked_add(HEADER_SIZE)
}

/// Step back from a payload pointer to its header.
///
/// # Safety
///
/// `payload` must have been produced by [`to_payload`] and the block must
/// still be live.
#[inline]
pub unsafe fn to_header(payload: NonNull<u8>) -> NonNull<BlockHeader> {
    // SAFETY: the caller guarantees HEADER_SIZE bytes precede `payload` in
    // the same allocation, so the result is in bounds and non-null.
    unsafe { NonNull::new_unchecked(payload.as_ptr().sub(HEADER_SIZE)).cast() }
}

/// Step forward from a header to the payload handed to callers.
///
/// # Safety
///
/// `header` must be the start of storage at least `HEADER_SIZE` bytes long.
#[inline]
pub unsafe fn to_payload(header: NonNull<BlockHeader>) -> NonNull<u8> {
    // SAFETY: in bounds per the caller's guarantee.
    unsafe { NonNull::new_unchecked(header.as_ptr().cast::<u8>().add(HEADER_SIZE)) }
}

/// # Safety
///
/// `header` must be valid for reads of `HEADER_SIZE` bytes.
#[inline]
pub unsafe fn read_size(header: NonNull<BlockHeader>) -> usize {
    // Platform storage is not guaranteed to honour our 16-byte alignment.
    unsafe { header.as_ptr().cast::<usize>().read_unaligned() }
}

/// # Safety
///
/// `header` must be valid for writes of `HEADER_SIZE` bytes.
#[inline]
pub unsafe fn write_size(header: NonNull<BlockHeader>, size: usize) {
    unsafe { header.as_ptr().cast::<usize>().write_unaligned(size) }
}

/// Size recorded for a live payload, i.e. what its caller asked for.
///
/// # Safety
///
/// `payload` must be a live pointer returned by an
/// [`AccountingAllocator`](crate::AccountingAllocator).
pub unsafe fn recorded_size(payload: NonNull<u8>) -> usize {
    unsafe { read_size(to_header(payload)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_payload_are_inverse() {
        let mut storage = [0u8; 64];
        let base = NonNull::new(storage.as_mut_ptr()).unwrap().cast::<BlockHeader>();
        unsafe {
            write_size(base, 48);
            let payload = to_payload(base);
            assert_eq!(payload.as_ptr() as usize - base.as_ptr() as usize, HEADER_SIZE);
            assert_eq!(to_header(payload), base);
            assert_eq!(recorded_size(payload), 48);
        }
    }

    #[test]
    fn accounted_rejects_wrapping_sizes() {
        assert_eq!(accounted(0), Some(HEADER_SIZE));
        assert_eq!(accounted(100), Some(116));
        assert_eq!(accounted(usize::MAX - HEADER_SIZE), Some(usize::MAX));
        assert_eq!(accounted(usize::MAX - HEADER_SIZE + 1), None);
    }
}
