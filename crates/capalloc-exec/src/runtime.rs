//! Runtime: drive one input through a host library on a bounded allocator.
//!
//! Each run:
//! - Resets the allocator's live-usage counter.
//! - Creates a fresh host context bound to the allocator's hook table.
//! - Opens the input, decodes it as a document, renders every page.
//! - Releases pixmap, document and stream on every exit path, then the context.
//!
//! Host failures are reported in the [`RunReport`]; they never abort the batch.

use capalloc_core::{AllocatorConfig, HostError, HostLibrary};
use capalloc_mem::{AccountingAllocator, LibcAlloc, PlatformAlloc, UsageStats};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid corpus directory: {0}")]
    InvalidDirectory(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one processing run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Pages the host reported, if the document opened.
    pub page_count: Option<usize>,
    pub pages_rendered: usize,
    /// The host failure that ended the run early, if any.
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<HostError>,
    pub peak_bytes: usize,
    /// Live usage left after the context was torn down. Should be zero.
    pub leaked_bytes: usize,
    pub stats: UsageStats,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<HostError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Resources a run may hold when a host call fails.
struct Held<H: HostLibrary> {
    stream: Option<H::Stream>,
    document: Option<H::Document>,
}

/// Owns the host and the allocator it allocates through.
pub struct Harness<H: HostLibrary, P: PlatformAlloc = LibcAlloc> {
    host: H,
    allocator: AccountingAllocator<P>,
    magic: String,
}

impl<H: HostLibrary> Harness<H> {
    pub fn new(host: H, cfg: &AllocatorConfig) -> Self {
        Self::with_allocator(
            host,
            AccountingAllocator::from_config(cfg),
            cfg.document_magic.clone(),
        )
    }
}

impl<H: HostLibrary, P: PlatformAlloc> Harness<H, P> {
    pub fn with_allocator(
        host: H,
        allocator: AccountingAllocator<P>,
        magic: impl Into<String>,
    ) -> Self {
        Self {
            host,
            allocator,
            magic: magic.into(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn allocator(&self) -> &AccountingAllocator<P> {
        &self.allocator
    }

    /// Process one input unit end to end.
    pub fn run_input(&mut self, data: &[u8]) -> RunReport {
        self.allocator.reset_usage();
        let hooks = self.allocator.hooks();
        let host = &self.host;

        let mut ctx = match host.new_context(hooks) {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::warn!(error = %err, "cannot create host context");
                return self.report(None, 0, Some(err));
            }
        };

        let mut held = Held::<H> {
            stream: None,
            document: None,
        };
        let mut page_count = None;
        let mut pages_rendered = 0;

        let outcome = render_all(
            host,
            &mut ctx,
            data,
            &self.magic,
            &mut held,
            &mut page_count,
            &mut pages_rendered,
        );

        // always
        if let Some(doc) = held.document.take() {
            host.drop_document(&mut ctx, doc);
        }
        if let Some(stream) = held.stream.take() {
            host.drop_stream(&mut ctx, stream);
        }

        // catch
        if let Err(err) = &outcome {
            tracing::warn!(error = %err, pages_rendered, "error rendering pages");
        }

        host.flush_warnings(&mut ctx);
        host.drop_context(ctx);

        self.report(page_count, pages_rendered, outcome.err())
    }

    fn report(
        &self,
        page_count: Option<usize>,
        pages_rendered: usize,
        error: Option<HostError>,
    ) -> RunReport {
        let leaked_bytes = self.allocator.used_bytes();
        if leaked_bytes != 0 {
            tracing::warn!(leaked_bytes, "allocations outlived the host context");
        }
        RunReport {
            page_count,
            pages_rendered,
            error,
            peak_bytes: self.allocator.peak_bytes(),
            leaked_bytes,
            stats: self.allocator.stats(),
        }
    }
}

fn render_all<H: HostLibrary>(
    host: &H,
    ctx: &mut H::Context,
    data: &[u8],
    magic: &str,
    held: &mut Held<H>,
    page_count: &mut Option<usize>,
    pages_rendered: &mut usize,
) -> Result<(), HostError> {
    let stream = held.stream.insert(host.open_memory(ctx, data)?);
    let doc = held
        .document
        .insert(host.open_document(ctx, stream, magic)?);

    let count = host.count_pages(ctx, doc)?;
    *page_count = Some(count);
    for page in 0..count {
        let pixmap = host.render_page(ctx, doc, page)?;
        host.drop_pixmap(ctx, pixmap);
        *pages_rendered += 1;
    }
    Ok(())
}
