//! capalloc-exec: processing runs and the batch driver.
//!
//! A [`Harness`] owns a host library and an accounting allocator, and pushes
//! one input buffer at a time through open/decode/render with cleanup on every
//! exit path. [`run_directory`] does that for each file in a corpus directory.
//! [`ScanHost`] is a built-in host so the binary runs without a third-party
//! document library.

pub mod batch;
pub mod runtime;
pub mod scan_host;

pub use batch::{list_inputs, run_directory, BatchSummary, FileReport};
pub use runtime::{ExecError, Harness, RunReport};
pub use scan_host::ScanHost;
