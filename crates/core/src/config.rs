//! Configuration and request types for PDF to PNG conversion.

use crate::error::{ConversionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Lowest accepted rasterization resolution.
pub const MIN_DPI: u32 = 50;
/// Highest accepted rasterization resolution.
pub const MAX_DPI: u32 = 300;
/// Resolution used when the caller does not pick one.
pub const DEFAULT_DPI: u32 = 300;

/// Extension (without the dot) of accepted input files.
pub const PDF_EXTENSION: &str = "pdf";

/// Stem used when a source path has no usable file name.
const FALLBACK_STEM: &str = "document";

/// Check whether a path names a PDF file, ignoring extension case.
pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(PDF_EXTENSION))
        .unwrap_or(false)
}

/// Validate that a DPI value is within [`MIN_DPI`, `MAX_DPI`].
pub fn validate_dpi(dpi: u32) -> Result<()> {
    if (MIN_DPI..=MAX_DPI).contains(&dpi) {
        Ok(())
    } else {
        Err(ConversionError::InvalidDpi { dpi })
    }
}

/// Configuration for the shared worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker threads shared by document and page fan-out.
    /// Default: number of CPU cores.
    pub concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
        }
    }
}

impl PoolConfig {
    /// Create a new pool config with the given concurrency limit.
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self { concurrency }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ConversionError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for page rendering and PNG output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Opaque color transparent pixels are flattened against.
    /// Default: white (255, 255, 255).
    pub background_color: (u8, u8, u8),

    /// PNG compression level (0-9, higher = smaller file, slower).
    /// Default: 6.
    pub png_compression: u8,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            background_color: (255, 255, 255),
            png_compression: 6,
        }
    }
}

impl RenderConfig {
    /// Set the flattening background color.
    pub fn background_color(mut self, rgb: (u8, u8, u8)) -> Self {
        self.background_color = rgb;
        self
    }

    /// Set PNG compression level.
    pub fn png_compression(mut self, level: u8) -> Self {
        self.png_compression = level.min(9);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.png_compression > 9 {
            return Err(ConversionError::InvalidConfig(
                "png_compression must be between 0 and 9".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn png_compression_mode(&self) -> png::Compression {
        match self.png_compression {
            0..=3 => png::Compression::Fast,
            4..=6 => png::Compression::Default,
            _ => png::Compression::Best,
        }
    }
}

/// Combined configuration for a [`crate::BatchConversionJob`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig {
    /// Pool configuration.
    pub pool: PoolConfig,

    /// Render configuration.
    pub render: RenderConfig,
}

impl JobConfig {
    /// Create a job config with the given concurrency limit.
    pub fn new(concurrency: usize) -> Self {
        Self {
            pool: PoolConfig::with_concurrency(concurrency),
            render: RenderConfig::default(),
        }
    }

    /// Replace the render configuration.
    pub fn with_render(mut self, render: RenderConfig) -> Self {
        self.render = render;
        self
    }

    /// Validate the entire configuration.
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.render.validate()?;
        Ok(())
    }
}

/// A batch of documents to convert. Immutable once a job starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Source PDFs in submission order. Duplicates are kept.
    pub input_paths: Vec<PathBuf>,

    /// Directory receiving one subdirectory per document.
    pub output_root: PathBuf,

    /// Rasterization resolution.
    pub dpi: u32,
}

impl ConversionRequest {
    /// Create a new request at [`DEFAULT_DPI`].
    pub fn new<I, P>(input_paths: I, output_root: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            input_paths: input_paths.into_iter().map(Into::into).collect(),
            output_root: output_root.into(),
            dpi: DEFAULT_DPI,
        }
    }

    /// Set the rasterization resolution.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Validate the request before a job starts.
    pub fn validate(&self) -> Result<()> {
        if self.input_paths.is_empty() {
            return Err(ConversionError::EmptyBatch);
        }
        validate_dpi(self.dpi)
    }

    /// Derive the per-document tasks, one per input path.
    ///
    /// Different sources with the same file stem share an output directory
    /// and overwrite each other's pages; that is logged, not rejected.
    pub fn document_tasks(&self) -> Vec<DocumentTask> {
        let tasks: Vec<DocumentTask> = self
            .input_paths
            .iter()
            .map(|p| DocumentTask::new(p, &self.output_root))
            .collect();

        for (task, first) in shared_output_dirs(&tasks) {
            warn!(
                "{:?} and {:?} both write into {:?}; pages will overwrite each other",
                first, task.source, task.output_dir
            );
        }
        tasks
    }
}

/// Tasks whose output directory was already claimed by a different source,
/// paired with that earlier source. Repeats of the same source are ignored.
pub(crate) fn shared_output_dirs(tasks: &[DocumentTask]) -> Vec<(&DocumentTask, &Path)> {
    let mut claimed: HashMap<&Path, &Path> = HashMap::new();
    let mut shared = Vec::new();
    for task in tasks {
        let owner = *claimed
            .entry(task.output_dir.as_path())
            .or_insert(task.source.as_path());
        if owner != task.source.as_path() {
            shared.push((task, owner));
        }
    }
    shared
}

/// One input document and where its pages go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTask {
    /// Source PDF.
    pub source: PathBuf,
    /// `output_root/<stem>`.
    pub output_dir: PathBuf,
    /// File stem used to name the output subdirectory and pages.
    pub stem: String,
}

impl DocumentTask {
    pub fn new(source: impl Into<PathBuf>, output_root: &Path) -> Self {
        let source = source.into();
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(FALLBACK_STEM)
            .to_string();
        let output_dir = output_root.join(&stem);
        Self {
            source,
            output_dir,
            stem,
        }
    }

    /// Task for the page at zero-based `index`.
    pub fn page(&self, index: usize) -> PageTask {
        PageTask {
            index,
            output_path: self
                .output_dir
                .join(format!("{}_page{}.png", self.stem, index + 1)),
        }
    }
}

/// One page of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTask {
    /// Zero-based page index.
    pub index: usize,
    /// `output_dir/<stem>_page<index+1>.png`.
    pub output_path: PathBuf,
}
