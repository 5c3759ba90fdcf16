//! Lightweight usage counters and peak tracking.
//!
//! Kept cheap: plain integers updated from the allocator's `&mut self` paths.

use serde::Serialize;

use crate::error::AllocError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub allocations: u64,
    pub reallocations: u64,
    pub releases: u64,
    pub zero_size_refusals: u64,
    pub overflow_refusals: u64,
    pub ceiling_refusals: u64,
    pub upstream_failures: u64,
    pub invalid_pointers: u64,
    /// Highest live-usage value observed.
    pub peak_bytes: usize,
}

impl UsageStats {
    /// Record a new "used bytes" value; updates peak if higher.
    pub(crate) fn record_used(&mut self, used_bytes: usize) {
        if used_bytes > self.peak_bytes {
            self.peak_bytes = used_bytes;
            tracing::trace!(used_bytes, peak = self.peak_bytes, "mem usage");
        }
    }

    pub(crate) fn record_refusal(&mut self, err: &AllocError) {
        let slot = match err {
            AllocError::ZeroSize => &mut self.zero_size_refusals,
            AllocError::Overflow { .. } => &mut self.overflow_refusals,
            AllocError::CeilingExceeded { .. } => &mut self.ceiling_refusals,
            AllocError::Upstream { .. } => &mut self.upstream_failures,
            AllocError::InvalidPointer { .. } => &mut self.invalid_pointers,
        };
        *slot += 1;
    }

    /// Total requests refused for any reason.
    pub fn refusals(&self) -> u64 {
        self.zero_size_refusals
            + self.overflow_refusals
            + self.ceiling_refusals
            + self.upstream_failures
            + self.invalid_pointers
    }
}
