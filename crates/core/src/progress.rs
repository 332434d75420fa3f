//! Progress aggregation and the sink interface consumed by front ends.
//!
//! Workers never talk to a [`ProgressSink`] directly. Each finished document
//! sends one completion event over a channel; the thread that called
//! [`crate::BatchConversionJob::run`] is the only one that mutates
//! [`ProgressState`] and invokes the sink, so sinks see a single, ordered
//! update path and need no locking of their own.

use crate::error::{ConversionError, ErrorKind};
use crate::job::JobResult;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Snapshot of batch progress, counted in finished documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Documents finished so far, successfully or not.
    pub completed_documents: usize,
    /// Documents in the batch.
    pub total_documents: usize,
    /// Human readable status line.
    pub current_label: String,
}

impl ProgressState {
    pub fn new(total_documents: usize) -> Self {
        Self {
            completed_documents: 0,
            total_documents,
            current_label: label(0, total_documents),
        }
    }

    /// Count one more finished document.
    ///
    /// The counter never passes `total_documents`; an extra event is logged
    /// and dropped.
    pub fn record_document(&mut self) {
        if self.completed_documents >= self.total_documents {
            warn!(
                "Ignoring completion beyond total ({} / {})",
                self.completed_documents, self.total_documents
            );
            return;
        }
        self.completed_documents += 1;
        self.current_label = label(self.completed_documents, self.total_documents);
    }

    pub fn is_finished(&self) -> bool {
        self.completed_documents == self.total_documents
    }

    /// Completed fraction in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        if self.total_documents == 0 {
            return 1.0;
        }
        self.completed_documents as f64 / self.total_documents as f64
    }
}

fn label(completed: usize, total: usize) -> String {
    format!("Converting: {} / {}", completed, total)
}

/// Receives progress updates and the terminal outcome of a job.
///
/// `on_progress` is called once per finished document with a monotonically
/// increasing `completed_documents`. Exactly one of `on_complete` or
/// `on_failure` follows.
pub trait ProgressSink: Send {
    fn on_progress(&mut self, progress: &ProgressState);

    /// Called once with the final result of a run that was not aborted.
    fn on_complete(&mut self, result: &JobResult) {
        let _ = result;
    }

    /// Called once if the run aborted with a fatal error.
    fn on_failure(&mut self, error: &ConversionError) {
        let _ = error;
    }
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressState) + Send,
{
    fn on_progress(&mut self, progress: &ProgressState) {
        self(progress)
    }
}

/// A sink that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_progress(&mut self, _progress: &ProgressState) {}
}

/// Event forwarded by [`ChannelProgressSink`].
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Progress(ProgressState),
    Completed(JobResult),
    Failed { kind: ErrorKind, message: String },
}

/// Forwards events over an `async_channel`, for event loops that drain
/// updates on their own thread (GUI toolkits, async runtimes).
///
/// A closed receiver is not an error; events are then discarded.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: async_channel::Sender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: async_channel::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink with an unbounded channel and return its receiver.
    pub fn unbounded() -> (Self, async_channel::Receiver<ProgressEvent>) {
        let (tx, rx) = async_channel::unbounded();
        (Self::new(tx), rx)
    }

    fn send(&self, event: ProgressEvent) {
        if self.tx.send_blocking(event).is_err() {
            warn!("Progress receiver dropped; discarding event");
        }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn on_progress(&mut self, progress: &ProgressState) {
        self.send(ProgressEvent::Progress(progress.clone()));
    }

    fn on_complete(&mut self, result: &JobResult) {
        self.send(ProgressEvent::Completed(result.clone()));
        self.tx.close();
    }

    fn on_failure(&mut self, error: &ConversionError) {
        self.send(ProgressEvent::Failed {
            kind: error.kind(),
            message: error.to_string(),
        });
        self.tx.close();
    }
}
