//! capalloc-mem: bounded, accounting allocator shim.
//!
//! Every block handed out carries a fixed-size header recording the size the
//! caller asked for, so `release`/`reallocate` recover the accounted size
//! without asking the platform allocator. A live-usage counter tracks
//! `size + HEADER_SIZE` for every outstanding block and is never allowed to
//! exceed the configured ceiling.
//!
//! The allocator itself is single-owner (`&mut self`). [`SharedAllocator`]
//! wraps it in a mutex for callers that need several threads on one budget.

pub mod allocator;
pub mod error;
pub mod header;
mod hooks;
pub mod platform;
pub mod shared;
pub mod stats;

pub use allocator::AccountingAllocator;
pub use error::{AllocError, AllocResult, Request};
pub use header::HEADER_SIZE;
pub use platform::{LibcAlloc, LimitedAlloc, PlatformAlloc};
pub use shared::SharedAllocator;
pub use stats::UsageStats;
