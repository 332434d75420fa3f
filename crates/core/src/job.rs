//! Batch orchestration across documents.
//!
//! One rayon pool of `concurrency` threads serves both fan-out levels:
//! documents are spread across it with `par_iter`, and each document's pages
//! are spread across the same pool from inside the worker. Work stealing keeps
//! the total number of busy threads at the configured limit no matter how
//! many documents are in flight.

use crate::cancel::CancellationToken;
use crate::config::{ConversionRequest, DocumentTask, JobConfig};
use crate::document::{DocumentConverter, DocumentOutcome, PageFailure};
use crate::error::{ConversionError, ErrorKind, Result};
use crate::progress::{ProgressSink, ProgressState};
use crate::rasterizer::PageRasterizer;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// A document that did not convert cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    /// Source PDF.
    pub source: PathBuf,
    /// Aggregated failure kind.
    pub kind: ErrorKind,
    /// Human readable description.
    pub message: String,
    /// Per-page failures, empty for open errors.
    pub failed_pages: Vec<PageFailure>,
}

/// Overall classification of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Every document converted without error.
    FullSuccess,
    /// Some output was produced, some documents or pages failed.
    PartialSuccess,
    /// Nothing was converted.
    TotalFailure,
}

/// Final result of a batch run. Computed once when every document is done.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Documents with no open error and no failed or skipped pages.
    pub succeeded_count: usize,
    /// One entry per document that did not fully succeed, in input order.
    pub failures: Vec<DocumentFailure>,
    /// Outcomes of every document that could be opened, in input order.
    pub documents: Vec<DocumentOutcome>,
    /// Documents in the request.
    pub total_documents: usize,
    /// PNG files written across the batch.
    pub total_pages_written: usize,
    /// Wall time of the whole run.
    pub duration: Duration,
    /// Whether the run was cancelled before it finished.
    pub cancelled: bool,
}

impl JobResult {
    pub fn status(&self) -> JobStatus {
        if self.failures.is_empty() {
            JobStatus::FullSuccess
        } else if self.succeeded_count == 0 && self.total_pages_written == 0 {
            JobStatus::TotalFailure
        } else {
            JobStatus::PartialSuccess
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == JobStatus::FullSuccess
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status() {
            JobStatus::FullSuccess => write!(
                f,
                "Converted {} document(s), {} page(s) written",
                self.succeeded_count, self.total_pages_written
            )?,
            JobStatus::PartialSuccess => write!(
                f,
                "Converted {} of {} document(s), {} page(s) written; {} document(s) failed:",
                self.succeeded_count,
                self.total_documents,
                self.total_pages_written,
                self.failures.len()
            )?,
            JobStatus::TotalFailure => write!(
                f,
                "All {} document(s) failed:",
                self.total_documents
            )?,
        }
        for failure in &self.failures {
            write!(
                f,
                "\n  - {}: {}: {}",
                failure.source.display(),
                failure.kind,
                failure.message
            )?;
        }
        if self.cancelled {
            write!(f, "\n(cancelled)")?;
        }
        Ok(())
    }
}

/// Per-document report sent from a worker to the aggregating thread.
enum DocumentReport {
    Converted(DocumentOutcome),
    OpenFailed {
        source: PathBuf,
        kind: ErrorKind,
        message: String,
    },
    NotStarted(DocumentOutcome),
}

/// Converts a batch of PDFs to PNGs with bounded two-level parallelism.
pub struct BatchConversionJob {
    config: JobConfig,
    documents: DocumentConverter,
    thread_pool: rayon::ThreadPool,
}

impl fmt::Debug for BatchConversionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConversionJob")
            .field("config", &self.config)
            .field("threads", &self.thread_pool.current_num_threads())
            .finish()
    }
}

impl BatchConversionJob {
    /// Create a job that renders through `rasterizer`.
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, config: JobConfig) -> Result<Self> {
        config.validate()?;

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.pool.concurrency)
            .thread_name(|i| format!("pdf2png-worker-{}", i))
            .build()
            .map_err(|e| {
                ConversionError::InvalidConfig(format!("Failed to create thread pool: {}", e))
            })?;

        info!(
            "Batch job initialized with {} worker threads",
            config.pool.concurrency
        );

        Ok(Self {
            documents: DocumentConverter::new(rasterizer, config.render.clone()),
            config,
            thread_pool,
        })
    }

    /// Create a job backed by the bundled pdfium rasterizer.
    #[cfg(feature = "pdfium")]
    pub fn with_pdfium(config: JobConfig) -> Result<Self> {
        let rasterizer = crate::pdfium::PdfiumRasterizer::new()?;
        Self::new(Arc::new(rasterizer), config)
    }

    /// Get the current configuration.
    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Run a batch to completion.
    pub fn run(
        &self,
        request: &ConversionRequest,
        sink: &mut dyn ProgressSink,
    ) -> Result<JobResult> {
        self.run_with_cancel(request, sink, &CancellationToken::new())
    }

    /// Run a batch, stopping new work once `cancel` is triggered.
    ///
    /// Progress is reported on the calling thread, once per finished
    /// document. Pages already being written when cancellation arrives are
    /// allowed to finish.
    pub fn run_with_cancel(
        &self,
        request: &ConversionRequest,
        sink: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<JobResult> {
        match self.execute(request, sink, cancel) {
            Ok(result) => {
                sink.on_complete(&result);
                Ok(result)
            }
            Err(e) => {
                error!("Batch conversion aborted: {}", e);
                sink.on_failure(&e);
                Err(e)
            }
        }
    }

    /// Run a batch on tokio's blocking pool.
    pub async fn run_async<S>(
        self: Arc<Self>,
        request: ConversionRequest,
        mut sink: S,
        cancel: CancellationToken,
    ) -> Result<JobResult>
    where
        S: ProgressSink + 'static,
    {
        tokio::task::spawn_blocking(move || self.run_with_cancel(&request, &mut sink, &cancel))
            .await
            .map_err(|e| ConversionError::Internal(format!("Conversion task panicked: {}", e)))?
    }

    fn execute(
        &self,
        request: &ConversionRequest,
        sink: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<JobResult> {
        let start = Instant::now();
        request.validate()?;
        prepare_output_root(&request.output_root)?;

        let tasks = request.document_tasks();
        let total = tasks.len();
        let dpi = request.dpi;
        info!(
            "Converting {} document(s) at {} DPI into {:?}",
            total, dpi, request.output_root
        );

        let mut progress = ProgressState::new(total);

        let (tx, rx) = crossbeam_channel::unbounded::<(usize, DocumentReport)>();
        let mut reports: Vec<Option<DocumentReport>> = (0..total).map(|_| None).collect();

        let joined = std::thread::scope(|scope| {
            let workers = scope.spawn(move || {
                self.thread_pool.install(|| {
                    tasks
                        .par_iter()
                        .enumerate()
                        .for_each_with(tx, |tx, (index, task)| {
                            let report = self.convert_one(task, dpi, cancel);
                            // The receiver outlives every worker.
                            let _ = tx.send((index, report));
                        });
                });
            });

            for (index, report) in rx.iter() {
                progress.record_document();
                sink.on_progress(&progress);
                reports[index] = Some(report);
            }

            workers.join()
        });

        if joined.is_err() {
            return Err(ConversionError::Internal(
                "A conversion worker panicked".to_string(),
            ));
        }

        let reports = reports
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                ConversionError::Internal("A document finished without reporting".to_string())
            })?;

        let result = summarize(reports, total, cancel.is_cancelled(), start.elapsed());
        info!(
            "Batch finished in {:?}: {} succeeded, {} failed, {} pages written",
            result.duration,
            result.succeeded_count,
            result.failures.len(),
            result.total_pages_written
        );
        Ok(result)
    }

    fn convert_one(
        &self,
        task: &DocumentTask,
        dpi: u32,
        cancel: &CancellationToken,
    ) -> DocumentReport {
        if cancel.is_cancelled() {
            return DocumentReport::NotStarted(DocumentOutcome::not_started(task));
        }
        match self.documents.convert(task, dpi, cancel) {
            Ok(outcome) => DocumentReport::Converted(outcome),
            Err(e) => {
                warn!("Skipping {:?}: {}", task.source, e);
                DocumentReport::OpenFailed {
                    source: task.source.clone(),
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Create the output root, failing the whole run if it cannot be used.
fn prepare_output_root(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root).map_err(|e| ConversionError::JobFatal {
        path: root.to_path_buf(),
        message: e.to_string(),
    })?;
    if !root.is_dir() {
        return Err(ConversionError::JobFatal {
            path: root.to_path_buf(),
            message: "not a directory".to_string(),
        });
    }
    Ok(())
}

fn summarize(
    reports: Vec<DocumentReport>,
    total_documents: usize,
    cancelled: bool,
    duration: Duration,
) -> JobResult {
    let mut result = JobResult {
        succeeded_count: 0,
        failures: Vec::new(),
        documents: Vec::new(),
        total_documents,
        total_pages_written: 0,
        duration,
        cancelled,
    };

    for report in reports {
        match report {
            DocumentReport::Converted(outcome) => {
                result.total_pages_written += outcome.pages_succeeded.len();
                if outcome.is_success() {
                    result.succeeded_count += 1;
                } else {
                    result.failures.push(page_failure_summary(&outcome));
                }
                result.documents.push(outcome);
            }
            DocumentReport::OpenFailed {
                source,
                kind,
                message,
            } => result.failures.push(DocumentFailure {
                source,
                kind,
                message,
                failed_pages: Vec::new(),
            }),
            DocumentReport::NotStarted(outcome) => result.failures.push(DocumentFailure {
                source: outcome.source,
                kind: ErrorKind::Cancelled,
                message: ConversionError::Cancelled.to_string(),
                failed_pages: Vec::new(),
            }),
        }
    }

    result
}

/// Aggregate a partially failed document into one failure entry.
///
/// The kind is that of the lowest-index failed page, or `Cancelled` when
/// pages were only skipped.
fn page_failure_summary(outcome: &DocumentOutcome) -> DocumentFailure {
    let (kind, message) = match outcome.pages_failed.first() {
        Some(first) => (
            first.kind,
            format!(
                "{} of {} page(s) failed; first: page {}: {}",
                outcome.pages_failed.len(),
                outcome.page_count,
                first.index + 1,
                first.message
            ),
        ),
        None => (
            ErrorKind::Cancelled,
            format!(
                "{} of {} page(s) skipped after cancellation",
                outcome.pages_skipped, outcome.page_count
            ),
        ),
    };

    DocumentFailure {
        source: outcome.source.clone(),
        kind,
        message,
        failed_pages: outcome.pages_failed.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageOutput;

    fn outcome(source: &str, written: usize, failed: &[usize], skipped: usize) -> DocumentOutcome {
        let page_count = written + failed.len() + skipped;
        DocumentOutcome {
            source: PathBuf::from(source),
            output_dir: PathBuf::from("/out"),
            page_count,
            pages_succeeded: (0..written)
                .map(|index| PageOutput {
                    index,
                    path: PathBuf::from(format!("/out/p{}.png", index)),
                    width: 1,
                    height: 1,
                })
                .collect(),
            pages_failed: failed
                .iter()
                .map(|&index| PageFailure {
                    index,
                    kind: ErrorKind::Write,
                    message: "disk full".into(),
                })
                .collect(),
            pages_skipped: skipped,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_summarize_counts_and_order() {
        let result = summarize(
            vec![
                DocumentReport::Converted(outcome("a.pdf", 2, &[], 0)),
                DocumentReport::OpenFailed {
                    source: PathBuf::from("b.pdf"),
                    kind: ErrorKind::DocumentOpen,
                    message: "corrupt".into(),
                },
                DocumentReport::Converted(outcome("c.pdf", 1, &[3, 1], 0)),
            ],
            3,
            false,
            Duration::ZERO,
        );

        assert_eq!(result.succeeded_count, 1);
        assert_eq!(result.total_pages_written, 3);
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].source, PathBuf::from("b.pdf"));
        assert_eq!(result.failures[0].kind, ErrorKind::DocumentOpen);
        assert_eq!(result.failures[1].kind, ErrorKind::Write);
        assert!(result.failures[1].message.contains("first: page 4"));
        assert_eq!(result.status(), JobStatus::PartialSuccess);
    }

    #[test]
    fn test_status_full_success() {
        let result = summarize(
            vec![DocumentReport::Converted(outcome("a.pdf", 1, &[], 0))],
            1,
            false,
            Duration::ZERO,
        );
        assert_eq!(result.status(), JobStatus::FullSuccess);
        assert!(result.to_string().starts_with("Converted 1 document(s)"));
    }

    #[test]
    fn test_status_total_failure() {
        let result = summarize(
            vec![DocumentReport::OpenFailed {
                source: PathBuf::from("x.pdf"),
                kind: ErrorKind::DocumentOpen,
                message: "missing".into(),
            }],
            1,
            false,
            Duration::ZERO,
        );
        assert_eq!(result.status(), JobStatus::TotalFailure);
        let summary = result.to_string();
        assert!(summary.contains("x.pdf"));
        assert!(summary.contains("DocumentOpenError"));
    }

    #[test]
    fn test_skipped_pages_aggregate_as_cancelled() {
        let result = summarize(
            vec![
                DocumentReport::Converted(outcome("a.pdf", 1, &[], 2)),
                DocumentReport::NotStarted(outcome("b.pdf", 0, &[], 0)),
            ],
            2,
            true,
            Duration::ZERO,
        );
        assert_eq!(result.failures.len(), 2);
        assert!(result
            .failures
            .iter()
            .all(|f| f.kind == ErrorKind::Cancelled));
        assert!(result.cancelled);
        assert_eq!(result.status(), JobStatus::PartialSuccess);
    }

    #[test]
    fn test_job_result_serializes() {
        let result = summarize(
            vec![DocumentReport::Converted(outcome("a.pdf", 1, &[], 0))],
            1,
            false,
            Duration::ZERO,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["succeeded_count"], 1);
        assert_eq!(json["total_pages_written"], 1);
    }

    #[test]
    fn test_output_root_that_is_a_file_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("taken");
        std::fs::write(&file, b"").unwrap();
        let err = prepare_output_root(&file).unwrap_err();
        assert!(matches!(err, ConversionError::JobFatal { .. }));
    }
}
