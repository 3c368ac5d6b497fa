//! Progress reporting and the single-active-operation tracker.
//!
//! Pipeline stages report `(percent, message)` pairs through a plain
//! [`ProgressFn`]. Host applications observe them by installing an
//! [`UnlockProgressCallback`] on a [`ProgressTracker`], which also guarantees
//! that only one operation (intake, flatten, merge, …) runs at a time.
//!
//! # Example
//!
//! ```rust
//! use pdfunlock::progress::{Operation, ProgressCallback, ProgressTracker, UnlockProgressCallback};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Recorder(Mutex<Vec<u8>>);
//!
//! impl UnlockProgressCallback for Recorder {
//!     fn on_progress(&self, percent: u8, _message: &str) {
//!         self.0.lock().unwrap().push(percent);
//!     }
//! }
//!
//! let recorder = Arc::new(Recorder::default());
//! let tracker = ProgressTracker::new(Some(recorder.clone() as ProgressCallback));
//! {
//!     let op = tracker.begin(Operation::Flatten).unwrap();
//!     op.report(50, "Flattening page 1 of 2");
//!     op.report(100, "Flattening page 2 of 2");
//!     op.complete();
//! }
//! assert!(tracker.is_idle());
//! assert_eq!(*recorder.0.lock().unwrap(), vec![50, 100]);
//! ```

use crate::error::UnlockError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Kinds of long-running work, one of which may be active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Intake,
    Flatten,
    Decrypt,
    Thumbnails,
    Merge,
    Split,
    ExportImages,
}

impl Operation {
    /// Verb used in output file names (`unlocked-report.pdf`).
    pub fn file_prefix(self) -> &'static str {
        match self {
            Operation::Intake | Operation::Decrypt => "unlocked",
            Operation::Flatten => "flattened",
            Operation::Thumbnails => "thumbnails",
            Operation::Merge => "merged",
            Operation::Split => "split",
            Operation::ExportImages => "images",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Intake => "intake",
            Operation::Flatten => "flatten",
            Operation::Decrypt => "decrypt",
            Operation::Thumbnails => "thumbnails",
            Operation::Merge => "merge",
            Operation::Split => "split",
            Operation::ExportImages => "export-images",
        };
        f.write_str(s)
    }
}

/// Per-step progress sink used inside the pipeline: `(percent, message)`.
pub type ProgressFn<'a> = &'a dyn Fn(u8, &str);

/// A sink that drops every event.
pub fn ignore_progress(_percent: u8, _message: &str) {}

/// `round(done / total × 100)`, saturating at 100. An empty run is complete.
pub fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (done.min(total) * 100 + total / 2) / total;
    pct as u8
}

/// One progress update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub percent: u8,
    pub message: String,
}

/// Snapshot of the active operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingProgress {
    pub operation: Operation,
    pub percent: u8,
    pub message: String,
}

/// Observer for operation lifecycle and progress.
///
/// All methods default to no-ops so implementors override only what they
/// need. Implementations must be `Send + Sync`: the async entry points report
/// from a blocking worker thread.
pub trait UnlockProgressCallback: Send + Sync {
    fn on_operation_start(&self, operation: Operation) {
        let _ = operation;
    }

    /// Called per page (or per file) with a percentage in `0..=100`.
    fn on_progress(&self, percent: u8, message: &str) {
        let _ = (percent, message);
    }

    fn on_operation_complete(&self, operation: Operation) {
        let _ = operation;
    }

    fn on_operation_failed(&self, operation: Operation, error: &str) {
        let _ = (operation, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl UnlockProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::UnlockConfig`].
pub type ProgressCallback = Arc<dyn UnlockProgressCallback>;

/// Forwards progress events into a tokio channel.
///
/// Backs [`crate::stream::flatten_stream`]; usable directly by hosts that
/// prefer a receiver to a callback.
pub struct ChannelProgressCallback {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressCallback {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UnlockProgressCallback for ChannelProgressCallback {
    fn on_progress(&self, percent: u8, message: &str) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(ProgressEvent {
            percent,
            message: message.to_string(),
        });
    }
}

/// Owner of the process-wide "one operation at a time" state.
pub struct ProgressTracker {
    state: Mutex<Option<ProcessingProgress>>,
    callback: Option<ProgressCallback>,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("state", &self.current())
            .field("callback", &self.callback.as_ref().map(|_| "<dyn UnlockProgressCallback>"))
            .finish()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ProgressTracker {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            state: Mutex::new(None),
            callback,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProcessingProgress>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the tracker for `operation`.
    ///
    /// Fails with [`UnlockError::Busy`] while another operation holds it.
    /// The returned guard resets the tracker to idle when dropped.
    pub fn begin(&self, operation: Operation) -> Result<OperationGuard<'_>, UnlockError> {
        {
            let mut state = self.lock();
            if let Some(active) = state.as_ref() {
                return Err(UnlockError::Busy {
                    running: active.operation.to_string(),
                });
            }
            *state = Some(ProcessingProgress {
                operation,
                percent: 0,
                message: String::new(),
            });
        }
        if let Some(cb) = &self.callback {
            cb.on_operation_start(operation);
        }
        Ok(OperationGuard {
            tracker: self,
            operation,
            finished: false,
        })
    }

    /// The active operation, or `None` when idle.
    pub fn current(&self) -> Option<ProcessingProgress> {
        self.lock().clone()
    }

    pub fn is_idle(&self) -> bool {
        self.lock().is_none()
    }
}

/// Exclusive handle on a [`ProgressTracker`] for one operation.
pub struct OperationGuard<'a> {
    tracker: &'a ProgressTracker,
    operation: Operation,
    finished: bool,
}

impl fmt::Debug for OperationGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationGuard")
            .field("operation", &self.operation)
            .field("finished", &self.finished)
            .finish()
    }
}

impl OperationGuard<'_> {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Record and forward a progress update.
    pub fn report(&self, percent: u8, message: &str) {
        let percent = percent.min(100);
        if let Some(active) = self.tracker.lock().as_mut() {
            active.percent = percent;
            active.message = message.to_string();
        }
        if let Some(cb) = &self.tracker.callback {
            cb.on_progress(percent, message);
        }
    }

    /// Finish successfully and release the tracker.
    pub fn complete(mut self) {
        self.finished = true;
        if let Some(cb) = &self.tracker.callback {
            cb.on_operation_complete(self.operation);
        }
    }

    /// Finish with an error and release the tracker.
    pub fn fail(mut self, error: &str) {
        self.finished = true;
        if let Some(cb) = &self.tracker.callback {
            cb.on_operation_failed(self.operation, error);
        }
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        *self.tracker.lock() = None;
        if !self.finished {
            if let Some(cb) = &self.tracker.callback {
                cb.on_operation_failed(self.operation, "operation aborted");
            }
        }
    }
}
