//! `ScanHost`: a small, dependency-free document host.
//!
//! It understands just enough PDF to find page objects and their media boxes,
//! then "renders" each page into a white RGB pixmap at 72 dpi. Every byte it
//! holds on behalf of the caller (context state, input copy, page table,
//! pixmaps) is obtained through the [`AllocHooks`] it was created with, so a
//! hostile media box runs straight into the allocator's ceiling.

use std::mem;
use std::ptr::{self, NonNull};

use capalloc_core::{AllocHooks, HostError, HostLibrary};

/// Bytes reserved for per-context state.
const CONTEXT_BYTES: usize = 1024;

/// Samples per pixel (RGB, no alpha).
const COMPONENTS: usize = 3;

/// How far into the input the `%PDF-` signature may appear.
const SIGNATURE_WINDOW: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageBox {
    /// US Letter, used when a page carries no usable `/MediaBox`.
    pub const LETTER: PageBox = PageBox {
        x0: 0.0,
        y0: 0.0,
        x1: 612.0,
        y1: 792.0,
    };

    fn from_coords(c: [f32; 4]) -> Option<Self> {
        let b = PageBox {
            x0: c[0],
            y0: c[1],
            x1: c[2],
            y1: c[3],
        };
        let (w, h) = (b.width(), b.height());
        (w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0).then_some(b)
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).abs()
    }

    /// Pixel dimensions at 72 dpi, rounded up. Saturates on absurd boxes.
    pub fn pixel_size(&self) -> (usize, usize) {
        (self.width().ceil() as usize, self.height().ceil() as usize)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScanHost;

impl ScanHost {
    pub fn new() -> Self {
        Self
    }
}

pub struct ScanContext {
    hooks: AllocHooks,
    state: NonNull<u8>,
    warnings: Vec<String>,
}

impl ScanContext {
    fn alloc(&mut self, what: &'static str, bytes: usize) -> Result<NonNull<u8>, HostError> {
        // SAFETY: the harness keeps the allocator behind `hooks` alive for the
        // lifetime of this context.
        NonNull::new(unsafe { self.hooks.alloc(bytes) })
            .ok_or(HostError::OutOfMemory { what, bytes })
    }

    fn release(&mut self, ptr: *mut u8) {
        unsafe { self.hooks.release(ptr) }
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}

/// Hook-allocated copy of the input bytes.
pub struct ScanStream {
    data: Option<NonNull<u8>>,
    len: usize,
}

impl ScanStream {
    pub fn as_slice(&self) -> &[u8] {
        match self.data {
            // SAFETY: `data` points at `len` initialized bytes until dropped.
            Some(data) => unsafe { std::slice::from_raw_parts(data.as_ptr(), self.len) },
            None => &[],
        }
    }
}

/// Page table grown with `realloc` as page objects are found.
pub struct ScanDocument {
    pages: *mut PageBox,
    len: usize,
    cap: usize,
}

impl ScanDocument {
    fn empty() -> Self {
        Self {
            pages: ptr::null_mut(),
            len: 0,
            cap: 0,
        }
    }

    fn push(&mut self, ctx: &mut ScanContext, page: PageBox) -> Result<(), HostError> {
        if self.len == self.cap {
            let cap = (self.cap * 2).max(4);
            let oom = HostError::OutOfMemory {
                what: "page table",
                bytes: usize::MAX,
            };
            let bytes = cap.checked_mul(mem::size_of::<PageBox>()).ok_or(oom)?;
            let grown = unsafe { ctx.hooks.resize(self.pages.cast(), bytes) };
            if grown.is_null() {
                return Err(HostError::OutOfMemory {
                    what: "page table",
                    bytes,
                });
            }
            self.pages = grown.cast();
            self.cap = cap;
        }
        // The allocator only promises 16-byte alignment of its own storage.
        unsafe { self.pages.add(self.len).write_unaligned(page) };
        self.len += 1;
        Ok(())
    }

    pub fn page(&self, index: usize) -> Option<PageBox> {
        (index < self.len).then(|| unsafe { self.pages.add(index).read_unaligned() })
    }

    pub fn page_count(&self) -> usize {
        self.len
    }
}

/// White RGB samples, `width * height * 3` bytes.
pub struct ScanPixmap {
    samples: NonNull<u8>,
    width: usize,
    height: usize,
}

impl ScanPixmap {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn samples(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(self.samples.as_ptr(), self.width * self.height * COMPONENTS)
        }
    }
}

impl HostLibrary for ScanHost {
    type Context = ScanContext;
    type Stream = ScanStream;
    type Document = ScanDocument;
    type Pixmap = ScanPixmap;

    fn new_context(&self, hooks: AllocHooks) -> Result<ScanContext, HostError> {
        let state = NonNull::new(unsafe { hooks.alloc(CONTEXT_BYTES) }).ok_or(
            HostError::OutOfMemory {
                what: "context",
                bytes: CONTEXT_BYTES,
            },
        )?;
        unsafe { state.as_ptr().write_bytes(0, CONTEXT_BYTES) };
        Ok(ScanContext {
            hooks,
            state,
            warnings: Vec::new(),
        })
    }

    fn open_memory(&self, ctx: &mut ScanContext, data: &[u8]) -> Result<ScanStream, HostError> {
        if data.is_empty() {
            return Ok(ScanStream { data: None, len: 0 });
        }
        let copy = ctx.alloc("input stream", data.len())?;
        unsafe { copy.as_ptr().copy_from_nonoverlapping(data.as_ptr(), data.len()) };
        Ok(ScanStream {
            data: Some(copy),
            len: data.len(),
        })
    }

    fn open_document(
        &self,
        ctx: &mut ScanContext,
        stream: &mut ScanStream,
        magic: &str,
    ) -> Result<ScanDocument, HostError> {
        if !magic.eq_ignore_ascii_case("pdf") && !magic.eq_ignore_ascii_case("application/pdf") {
            return Err(HostError::Format(magic.to_string()));
        }
        let data = stream.as_slice();
        let window = &data[..data.len().min(SIGNATURE_WINDOW)];
        if find(window, b"%PDF-", 0).is_none() {
            return Err(HostError::Format("no %PDF- signature".into()));
        }

        let mut doc = ScanDocument::empty();
        let mut at = 0;
        while let Some(pos) = next_page_object(data, at) {
            at = pos + 1;
            let page = match media_box(data, pos) {
                Some(page) => page,
                None => {
                    ctx.warn(format!("page object at offset {pos} has no usable /MediaBox"));
                    PageBox::LETTER
                }
            };
            if let Err(err) = doc.push(ctx, page) {
                self.drop_document(ctx, doc);
                return Err(err);
            }
        }

        if doc.page_count() == 0 {
            self.drop_document(ctx, doc);
            return Err(HostError::Corrupt("cannot find any page objects".into()));
        }
        Ok(doc)
    }

    fn count_pages(&self, _ctx: &mut ScanContext, doc: &ScanDocument) -> Result<usize, HostError> {
        Ok(doc.page_count())
    }

    fn render_page(
        &self,
        ctx: &mut ScanContext,
        doc: &ScanDocument,
        page: usize,
    ) -> Result<ScanPixmap, HostError> {
        let media = doc.page(page).ok_or(HostError::PageRange {
            page,
            count: doc.page_count(),
        })?;
        let (width, height) = media.pixel_size();
        let bytes = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(COMPONENTS))
            .ok_or(HostError::OutOfMemory {
                what: "pixmap",
                bytes: usize::MAX,
            })?;
        let samples = ctx.alloc("pixmap", bytes)?;
        unsafe { samples.as_ptr().write_bytes(0xFF, bytes) };
        Ok(ScanPixmap {
            samples,
            width,
            height,
        })
    }

    fn drop_pixmap(&self, ctx: &mut ScanContext, pixmap: ScanPixmap) {
        ctx.release(pixmap.samples.as_ptr());
    }

    fn drop_document(&self, ctx: &mut ScanContext, doc: ScanDocument) {
        ctx.release(doc.pages.cast());
    }

    fn drop_stream(&self, ctx: &mut ScanContext, stream: ScanStream) {
        if let Some(data) = stream.data {
            ctx.release(data.as_ptr());
        }
    }

    fn flush_warnings(&self, ctx: &mut ScanContext) {
        for warning in ctx.warnings.drain(..) {
            tracing::debug!(%warning, "host warning");
        }
    }

    fn drop_context(&self, mut ctx: ScanContext) {
        let state = ctx.state.as_ptr();
        ctx.release(state);
    }
}

// ----- minimal PDF scanning -----

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn skip_ws(data: &[u8], mut at: usize) -> usize {
    while data.get(at).is_some_and(|b| b.is_ascii_whitespace()) {
        at += 1;
    }
    at
}

/// Offset of the next `/Type /Page` (but not `/Pages`) at or after `from`.
fn next_page_object(data: &[u8], from: usize) -> Option<usize> {
    let mut at = from;
    while let Some(pos) = find(data, b"/Type", at) {
        at = pos + 1;
        let value = skip_ws(data, pos + b"/Type".len());
        if data.get(value..value + 5) != Some(b"/Page".as_slice()) {
            continue;
        }
        let next = data.get(value + 5);
        if next.is_some_and(|b| b.is_ascii_alphanumeric()) {
            continue;
        }
        return Some(pos);
    }
    None
}

/// `/MediaBox [x0 y0 x1 y1]` within the object that contains `pos`.
fn media_box(data: &[u8], pos: usize) -> Option<PageBox> {
    let start = rfind(&data[..pos], b"obj").unwrap_or(0);
    let end = find(data, b"endobj", pos).unwrap_or(data.len());
    let object = &data[start..end];

    let key = find(object, b"/MediaBox", 0)?;
    let open = skip_ws(object, key + b"/MediaBox".len());
    if object.get(open) != Some(&b'[') {
        return None;
    }
    let close = find(object, b"]", open)?;
    let text = std::str::from_utf8(&object[open + 1..close]).ok()?;

    let mut coords = [0f32; 4];
    let mut parts = text.split_ascii_whitespace();
    for slot in coords.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    PageBox::from_coords(coords)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PAGES: &[u8] = b"%PDF-1.7\n\
        1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
        2 0 obj << /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >> endobj\n\
        3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 200 100] >> endobj\n\
        4 0 obj << /Type/Page /Parent 2 0 R >> endobj\n\
        %%EOF\n";

    #[test]
    fn finds_page_objects_but_not_page_trees() {
        let first = next_page_object(TWO_PAGES, 0).expect("first page");
        let second = next_page_object(TWO_PAGES, first + 1).expect("second page");
        assert!(next_page_object(TWO_PAGES, second + 1).is_none());
        assert_eq!(
            media_box(TWO_PAGES, first),
            Some(PageBox {
                x0: 0.0,
                y0: 0.0,
                x1: 200.0,
                y1: 100.0
            })
        );
        assert_eq!(media_box(TWO_PAGES, second), None);
    }

    #[test]
    fn degenerate_boxes_are_rejected() {
        assert!(PageBox::from_coords([0.0, 0.0, 0.0, 10.0]).is_none());
        assert!(PageBox::from_coords([0.0, 0.0, f32::INFINITY, 10.0]).is_none());
        assert!(PageBox::from_coords([0.0, 0.0, f32::NAN, 10.0]).is_none());
        let flipped = PageBox::from_coords([100.0, 50.0, 0.0, 0.0]).expect("flipped ok");
        assert_eq!(flipped.pixel_size(), (100, 50));
    }

    #[test]
    fn malformed_media_boxes_fall_back() {
        let doc = b"%PDF-1.4 1 0 obj << /Type /Page /MediaBox [0 0 abc 10] >> endobj";
        let pos = next_page_object(doc, 0).expect("page");
        assert_eq!(media_box(doc, pos), None);
        let doc = b"%PDF-1.4 1 0 obj << /Type /Page /MediaBox [0 0 10] >> endobj";
        assert_eq!(media_box(doc, next_page_object(doc, 0).expect("page")), None);
    }
}
