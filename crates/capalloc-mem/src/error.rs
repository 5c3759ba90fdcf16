use std::fmt;

use capalloc_core::config::MIB;
use thiserror::Error;

/// Result type local to capalloc-mem.
pub type AllocResult<T> = std::result::Result<T, AllocError>;

/// The request that tripped the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// A fresh block of `total` accounted bytes.
    Allocation { total: usize },
    /// Resizing a block from `old_total` to `new_total` accounted bytes.
    Reallocation { old_total: usize, new_total: usize },
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Allocation { total } => write!(f, "allocation: {total}"),
            Request::Reallocation {
                old_total,
                new_total,
            } => write!(f, "reallocation: {old_total} -> {new_total}"),
        }
    }
}

/// Why a request was refused. Hosts see every variant as a null pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("zero-size allocation refused")]
    ZeroSize,

    #[error("requested size {requested} overflows when the block header is added")]
    Overflow { requested: usize },

    #[error("limit: {} Mbyte used: {} Mbyte {request}: limit reached", .ceiling / MIB, .used / MIB)]
    CeilingExceeded {
        request: Request,
        used: usize,
        ceiling: usize,
    },

    #[error("platform allocator failed to provide {bytes} bytes")]
    Upstream { bytes: usize },

    #[error("pointer {addr:#x} cannot carry a block header")]
    InvalidPointer { addr: usize },
}
