//! [`PageRasterizer`] backed by pdfium (Google's PDF engine).
//!
//! pdfium is bound once per process and shared by every worker thread. The
//! library is not reentrant, so every call into it (loading, rendering and
//! closing documents) holds the engine's call lock. Pages therefore
//! rasterize one at a time, while flattening, encoding and writing of the
//! rendered pages still run in parallel.

use crate::error::{ConversionError, Result};
use crate::rasterizer::{pixels_at_dpi, DocumentHandle, PageRasterizer};
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, info};

/// The process-wide pdfium binding.
#[derive(Debug)]
struct PdfiumEngine {
    pdfium: Pdfium,
    calls: Mutex<()>,
}

impl PdfiumEngine {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static ENGINE: OnceLock<PdfiumEngine> = OnceLock::new();

/// Held while binding. A second `Pdfium` would wait forever on the first.
static BINDING: Mutex<()> = Mutex::new(());

/// Bind to the pdfium shared library.
///
/// Tries `library_dir` first when given, then `./`, `/usr/lib`,
/// `/usr/local/lib`, then the system library search path.
fn bind_pdfium(library_dir: Option<&Path>) -> Result<Pdfium> {
    let explicit = library_dir
        .map(|dir| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)));

    let bindings = match explicit {
        Some(Ok(bindings)) => Ok(bindings),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("/usr/lib"))
            })
            .or_else(|_| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                    "/usr/local/lib",
                ))
            })
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ConversionError::Pdfium(format!("Failed to load pdfium library: {}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Get the shared engine, binding it on first use.
///
/// A failed bind is not cached, so a later call may retry with another
/// directory. Once bound, `library_dir` is ignored.
fn engine(library_dir: Option<&Path>) -> Result<&'static PdfiumEngine> {
    if let Some(engine) = ENGINE.get() {
        return Ok(engine);
    }

    let _binding = BINDING.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(engine) = ENGINE.get() {
        return Ok(engine);
    }

    let pdfium = bind_pdfium(library_dir)?;
    info!("pdfium library bound");
    Ok(ENGINE.get_or_init(|| PdfiumEngine {
        pdfium,
        calls: Mutex::new(()),
    }))
}

/// Opens PDFs with pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    engine: &'static PdfiumEngine,
}

impl PdfiumRasterizer {
    /// Create a rasterizer using the default library search order.
    ///
    /// Fails with [`ConversionError::Pdfium`] if the library cannot be bound.
    pub fn new() -> Result<Self> {
        Self::with_library_dir(None)
    }

    /// Create a rasterizer that looks for pdfium in `dir` first.
    ///
    /// Every rasterizer in the process shares one binding; `dir` only
    /// matters for the first one created.
    pub fn with_library_dir(dir: Option<PathBuf>) -> Result<Self> {
        let engine = engine(dir.as_deref())?;
        debug!("pdfium rasterizer ready");
        Ok(Self { engine })
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentHandle>> {
        let open_error = |message: String| ConversionError::DocumentOpen {
            path: path.to_path_buf(),
            message,
        };

        let bytes = std::fs::read(path).map_err(|e| open_error(e.to_string()))?;

        let _calls = self.engine.lock();
        let document = self
            .engine
            .pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|e| open_error(format!("Failed to load PDF: {}", e)))?;
        let page_count = usize::from(document.pages().len());

        Ok(Box::new(PdfiumDocument {
            engine: self.engine,
            document: Some(document),
            page_count,
        }))
    }
}

/// A loaded PDF. Closed under the engine's call lock when dropped.
struct PdfiumDocument {
    engine: &'static PdfiumEngine,
    document: Option<PdfDocument<'static>>,
    page_count: usize,
}

impl DocumentHandle for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn render_page(&self, index: usize, dpi: u32) -> Result<RgbaImage> {
        let page_number = index + 1;
        let raster_error = |message: String| ConversionError::Rasterization {
            page: page_number,
            message,
        };

        let page_index = u16::try_from(index)
            .ok()
            .filter(|_| index < self.page_count)
            .ok_or_else(|| raster_error("page index out of range".to_string()))?;

        let _calls = self.engine.lock();
        let document = self
            .document
            .as_ref()
            .ok_or_else(|| raster_error("document already closed".to_string()))?;

        let page = document
            .pages()
            .get(page_index)
            .map_err(|e| raster_error(format!("Failed to get page: {}", e)))?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(pixels_at_dpi(page.width().value, dpi) as i32)
            .set_target_height(pixels_at_dpi(page.height().value, dpi) as i32)
            .rotate_if_landscape(PdfPageRenderRotation::None, false);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| raster_error(format!("Failed to render: {}", e)))?;

        Ok(bitmap.as_image().into_rgba8())
    }
}

impl Drop for PdfiumDocument {
    fn drop(&mut self) {
        let _calls = self.engine.lock();
        self.document.take();
    }
}
