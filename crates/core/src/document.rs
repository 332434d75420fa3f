//! Per-document conversion: open once, fan pages out, collect outcomes.

use crate::cancel::CancellationToken;
use crate::config::{DocumentTask, RenderConfig};
use crate::error::{ErrorKind, Result};
use crate::page::{PageConverter, PageOutput};
use crate::rasterizer::PageRasterizer;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A page that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    /// Zero-based page index.
    pub index: usize,
    pub kind: ErrorKind,
    pub message: String,
}

/// What happened to one document whose file could be opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    /// Source PDF.
    pub source: PathBuf,
    /// Directory holding this document's pages.
    pub output_dir: PathBuf,
    /// Pages reported by the document.
    pub page_count: usize,
    /// Written pages, in page order.
    pub pages_succeeded: Vec<PageOutput>,
    /// Failed pages, in page order.
    pub pages_failed: Vec<PageFailure>,
    /// Pages never started because the job was cancelled.
    pub pages_skipped: usize,
    /// Wall time spent on this document.
    pub duration: Duration,
}

impl DocumentOutcome {
    /// Outcome for a document that was never started.
    pub(crate) fn not_started(task: &DocumentTask) -> Self {
        Self {
            source: task.source.clone(),
            output_dir: task.output_dir.clone(),
            page_count: 0,
            pages_succeeded: Vec::new(),
            pages_failed: Vec::new(),
            pages_skipped: 0,
            duration: Duration::ZERO,
        }
    }

    /// True when every page was written.
    pub fn is_success(&self) -> bool {
        self.pages_failed.is_empty() && self.pages_skipped == 0
    }
}

enum PageResult {
    Written(PageOutput),
    Failed(PageFailure),
    Skipped,
}

/// Converts whole documents through a [`PageRasterizer`].
#[derive(Clone)]
pub struct DocumentConverter {
    rasterizer: Arc<dyn PageRasterizer>,
    pages: PageConverter,
}

impl std::fmt::Debug for DocumentConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentConverter")
            .field("pages", &self.pages)
            .finish_non_exhaustive()
    }
}

impl DocumentConverter {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, render: RenderConfig) -> Self {
        Self {
            rasterizer,
            pages: PageConverter::new(render),
        }
    }

    /// Convert `source` into `output_root/<stem>/`.
    pub fn convert_document(
        &self,
        source: &Path,
        output_root: &Path,
        dpi: u32,
    ) -> Result<DocumentOutcome> {
        let task = DocumentTask::new(source, output_root);
        self.convert(&task, dpi, &CancellationToken::new())
    }

    /// Convert one document task.
    ///
    /// Fails only with [`crate::ConversionError::DocumentOpen`]; page failures
    /// are recorded in the outcome. Pages run on the current rayon pool.
    pub fn convert(
        &self,
        task: &DocumentTask,
        dpi: u32,
        cancel: &CancellationToken,
    ) -> Result<DocumentOutcome> {
        let start = Instant::now();

        let document = self.rasterizer.open(&task.source)?;
        let page_count = document.page_count();
        debug!("Opened {:?}: {} pages", task.source, page_count);

        let mut outcome = DocumentOutcome {
            page_count,
            ..DocumentOutcome::not_started(task)
        };

        // Created once up front so page workers never race on it.
        if let Err(e) = std::fs::create_dir_all(&task.output_dir) {
            warn!(
                "Cannot create output directory {:?}: {}",
                task.output_dir, e
            );
            let message = format!(
                "Failed to create output directory '{}': {}",
                task.output_dir.display(),
                e
            );
            outcome.pages_failed = (0..page_count)
                .map(|index| PageFailure {
                    index,
                    kind: ErrorKind::Write,
                    message: message.clone(),
                })
                .collect();
            outcome.duration = start.elapsed();
            return Ok(outcome);
        }

        let results: Vec<PageResult> = (0..page_count)
            .into_par_iter()
            .map(|index| {
                if cancel.is_cancelled() {
                    return PageResult::Skipped;
                }
                let page_task = task.page(index);
                match self.pages.convert(document.as_ref(), &page_task, dpi) {
                    Ok(output) => PageResult::Written(output),
                    Err(e) => {
                        warn!("Page {} of {:?} failed: {}", index + 1, task.source, e);
                        PageResult::Failed(PageFailure {
                            index,
                            kind: e.kind(),
                            message: e.to_string(),
                        })
                    }
                }
            })
            .collect();

        drop(document);

        for result in results {
            match result {
                PageResult::Written(output) => outcome.pages_succeeded.push(output),
                PageResult::Failed(failure) => outcome.pages_failed.push(failure),
                PageResult::Skipped => outcome.pages_skipped += 1,
            }
        }
        outcome.duration = start.elapsed();

        info!(
            "Converted {:?}: {}/{} pages written, {} failed, {} skipped in {:?}",
            task.source,
            outcome.pages_succeeded.len(),
            page_count,
            outcome.pages_failed.len(),
            outcome.pages_skipped,
            outcome.duration
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use crate::rasterizer::DocumentHandle;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    /// Documents are named `<pages>.pdf`; page `fail` (1-based) cannot render.
    struct CountingRasterizer {
        fail: Option<usize>,
    }

    struct CountingDocument {
        pages: usize,
        fail: Option<usize>,
    }

    impl PageRasterizer for CountingRasterizer {
        fn open(&self, path: &Path) -> Result<Box<dyn DocumentHandle>> {
            let pages = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ConversionError::DocumentOpen {
                    path: path.to_path_buf(),
                    message: "unparseable".into(),
                })?;
            Ok(Box::new(CountingDocument {
                pages,
                fail: self.fail,
            }))
        }
    }

    impl DocumentHandle for CountingDocument {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn render_page(&self, index: usize, _dpi: u32) -> Result<RgbaImage> {
            if self.fail == Some(index + 1) {
                return Err(ConversionError::Rasterization {
                    page: index + 1,
                    message: "bad content stream".into(),
                });
            }
            Ok(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255])))
        }
    }

    fn converter(fail: Option<usize>) -> DocumentConverter {
        DocumentConverter::new(
            Arc::new(CountingRasterizer { fail }),
            RenderConfig::default(),
        )
    }

    #[test]
    fn test_convert_document_writes_every_page() {
        let out = TempDir::new().unwrap();
        let outcome = converter(None)
            .convert_document(Path::new("/in/3.pdf"), out.path(), 72)
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.page_count, 3);
        let indices: Vec<_> = outcome.pages_succeeded.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        for n in 1..=3 {
            assert!(out.path().join("3").join(format!("3_page{}.png", n)).exists());
        }
    }

    #[test]
    fn test_zero_page_document_is_success() {
        let out = TempDir::new().unwrap();
        let outcome = converter(None)
            .convert_document(Path::new("0.pdf"), out.path(), 72)
            .unwrap();
        assert!(outcome.is_success());
        assert!(outcome.pages_succeeded.is_empty());
        assert!(out.path().join("0").is_dir());
    }

    #[test]
    fn test_failing_page_does_not_abort_siblings() {
        let out = TempDir::new().unwrap();
        let outcome = converter(Some(2))
            .convert_document(Path::new("4.pdf"), out.path(), 72)
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.pages_succeeded.len(), 3);
        assert_eq!(outcome.pages_failed.len(), 1);
        assert_eq!(outcome.pages_failed[0].index, 1);
        assert_eq!(outcome.pages_failed[0].kind, ErrorKind::Rasterization);
        assert!(!out.path().join("4").join("4_page2.png").exists());
    }

    #[test]
    fn test_open_error_is_returned() {
        let out = TempDir::new().unwrap();
        let err = converter(None)
            .convert_document(Path::new("garbage.pdf"), out.path(), 72)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentOpen);
        assert!(!out.path().join("garbage").exists());
    }

    #[test]
    fn test_existing_output_directory_is_reused() {
        let out = TempDir::new().unwrap();
        std::fs::create_dir_all(out.path().join("2")).unwrap();
        let outcome = converter(None)
            .convert_document(Path::new("2.pdf"), out.path(), 72)
            .unwrap();
        assert!(outcome.is_success());
    }

    #[test]
    fn test_cancelled_token_skips_pages() {
        let out = TempDir::new().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let task = DocumentTask::new("5.pdf", out.path());

        let outcome = converter(None).convert(&task, 72, &token).unwrap();
        assert_eq!(outcome.pages_skipped, 5);
        assert!(outcome.pages_succeeded.is_empty());
        assert!(!outcome.is_success());
    }
}
