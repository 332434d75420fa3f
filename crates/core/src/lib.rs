//! # pdf-to-png-core
//!
//! Parallel batch conversion of PDF documents to per-page PNG images.
//!
//! A [`BatchConversionJob`] fans documents out across a shared worker pool,
//! each document fans its pages out across the same pool, and every page is
//! rasterized, flattened onto an opaque background and written atomically as
//! `{output_root}/{name}/{name}_page{N}.png`.
//!
//! - **pdfium** (Google's PDF engine) for rasterization, behind the
//!   [`PageRasterizer`] trait
//! - **rayon** for bounded two-level parallelism
//! - Progress reported once per finished document, on the calling thread
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_to_png_core::{BatchConversionJob, ConversionRequest, JobConfig, ProgressState};
//!
//! fn main() -> pdf_to_png_core::Result<()> {
//!     let job = BatchConversionJob::with_pdfium(JobConfig::default())?;
//!
//!     let request = ConversionRequest::new(["a.pdf", "b.pdf"], "./output").with_dpi(150);
//!     let result = job.run(&request, &mut |p: &ProgressState| {
//!         println!("{}", p.current_label);
//!     })?;
//!
//!     println!("{}", result);
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod document;
pub mod error;
pub mod job;
pub mod page;
#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod progress;
pub mod rasterizer;

// Re-export main types for convenience
pub use cancel::CancellationToken;
pub use config::{
    is_pdf_path, ConversionRequest, DocumentTask, JobConfig, PageTask, PoolConfig, RenderConfig,
    DEFAULT_DPI, MAX_DPI, MIN_DPI,
};
pub use document::{DocumentConverter, DocumentOutcome, PageFailure};
pub use error::{ConversionError, ErrorKind, Result};
pub use job::{BatchConversionJob, DocumentFailure, JobResult, JobStatus};
pub use page::{PageConverter, PageOutput};
#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRasterizer;
pub use progress::{
    ChannelProgressSink, NoopProgressSink, ProgressEvent, ProgressSink, ProgressState,
};
pub use rasterizer::{DocumentHandle, PageRasterizer};

/// Initialize the library's logging.
/// Call this once at application startup if you want to see logs.
pub fn init_logging() {
    init_logging_with_default("error");
}

/// Initialize logging to stderr, using `default_directive` when `RUST_LOG`
/// is unset or invalid.
pub fn init_logging_with_default(default_directive: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
