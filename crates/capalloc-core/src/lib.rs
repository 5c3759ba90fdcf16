//! capalloc-core: shared vocabulary for the bounded accounting allocator.
//!
//! This crate holds the *interfaces* that the allocator (`capalloc-mem`) and
//! the processing harness (`capalloc-exec`) agree on: the ceiling
//! configuration, the C-ABI allocation hook table handed to a host library,
//! and the host-library trait itself. No allocation logic lives here.

pub mod config;
pub mod error;
pub mod hooks;
pub mod host;

pub use config::{AllocatorConfig, ConfigFile};
pub use error::{Error, Result};
pub use hooks::AllocHooks;
pub use host::{HostError, HostLibrary};
