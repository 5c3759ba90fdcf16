//! Abstract host-library interface.
//!
//! The host is a third-party document library configured to allocate through
//! [`AllocHooks`]. We keep only the trait here; `capalloc-exec` drives it and
//! ships one lightweight implementation. Resource handles are released
//! explicitly through the `drop_*` methods (they may own hook-allocated
//! memory, which only the host knows how to return), so callers must run those
//! on every exit path.

use thiserror::Error;

use crate::hooks::AllocHooks;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The allocator refused a request (ceiling, overflow, or upstream failure).
    #[error("out of memory allocating {bytes} bytes for {what}")]
    OutOfMemory { what: &'static str, bytes: usize },

    #[error("unsupported document type: {0}")]
    Format(String),

    #[error("corrupt document: {0}")]
    Corrupt(String),

    #[error("page {page} out of range (document has {count})")]
    PageRange { page: usize, count: usize },

    #[error("host library error: {0}")]
    Other(String),
}

/// A document-processing library driven one input at a time.
pub trait HostLibrary {
    type Context;
    type Stream;
    type Document;
    type Pixmap;

    /// Create a fresh execution context that allocates through `hooks`.
    fn new_context(&self, hooks: AllocHooks) -> Result<Self::Context, HostError>;

    /// Wrap an in-memory byte buffer as an input stream.
    fn open_memory(&self, ctx: &mut Self::Context, data: &[u8])
        -> Result<Self::Stream, HostError>;

    /// Decode `stream` as a document of type `magic`.
    fn open_document(
        &self,
        ctx: &mut Self::Context,
        stream: &mut Self::Stream,
        magic: &str,
    ) -> Result<Self::Document, HostError>;

    fn count_pages(&self, ctx: &mut Self::Context, doc: &Self::Document)
        -> Result<usize, HostError>;

    /// Render page `page` (zero-based) into a pixel buffer.
    fn render_page(
        &self,
        ctx: &mut Self::Context,
        doc: &Self::Document,
        page: usize,
    ) -> Result<Self::Pixmap, HostError>;

    fn drop_pixmap(&self, ctx: &mut Self::Context, pixmap: Self::Pixmap);

    fn drop_document(&self, ctx: &mut Self::Context, doc: Self::Document);

    fn drop_stream(&self, ctx: &mut Self::Context, stream: Self::Stream);

    /// Emit any warnings the host buffered during the run.
    fn flush_warnings(&self, _ctx: &mut Self::Context) {}

    /// Tear down the context. Called exactly once per successful `new_context`.
    fn drop_context(&self, ctx: Self::Context);
}
