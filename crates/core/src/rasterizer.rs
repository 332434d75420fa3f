//! The page-rasterization contract the pipeline renders through.
//!
//! The core never parses PDF itself. A [`PageRasterizer`] opens documents and
//! hands back a [`DocumentHandle`] that can render individual pages; the
//! bundled pdfium backend lives in [`crate::pdfium`].

use crate::error::Result;
use image::RgbaImage;
use std::path::Path;

/// PDF points per inch.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Opens documents for rendering.
pub trait PageRasterizer: Send + Sync {
    /// Open a document.
    ///
    /// Fails with [`crate::ConversionError::DocumentOpen`] if the file is
    /// missing, unreadable or not a valid PDF.
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentHandle>>;
}

/// An open document. Dropping the handle releases it.
///
/// Handles are shared by reference across the page workers of one document,
/// so rendering must be safe to call concurrently.
pub trait DocumentHandle: Send + Sync {
    /// Number of pages; zero is valid.
    fn page_count(&self) -> usize;

    /// Render the page at zero-based `index` at `dpi`.
    ///
    /// The returned image may carry transparency; callers flatten it.
    /// Fails with [`crate::ConversionError::Rasterization`].
    fn render_page(&self, index: usize, dpi: u32) -> Result<RgbaImage>;
}

/// Pixel length of `points` at `dpi`, rounded, never below one pixel.
pub fn pixels_at_dpi(points: f32, dpi: u32) -> u32 {
    ((points * dpi as f32) / POINTS_PER_INCH).round().max(1.0) as u32
}
