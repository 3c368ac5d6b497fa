//! Batch intake: bring files into a [`Workspace`], unlocking them on the way.
//!
//! Per file:
//!
//! ```text
//! CheckingFile ──▶ NotEncrypted ───────────────────────────────▶ commit
//!      │
//!      ├─ opens, still protected ─▶ Decrypting ─────────────────▶ commit
//!      │                                │ copy refused
//!      ├─ password failure ─▶ TryingEmptyPassword ─┐
//!      ├─ unsupported security ────────────────────┴─▶ AutoFlattening ─▶ commit
//!      └─ corrupt ─▶ skip                                    │
//!                                                            ▼
//!                                                  AwaitingUserPassword
//! ```
//!
//! When a file needs a password the batch pauses: the file and the rest of
//! the batch are stashed, and [`IntakeOutcome::AwaitingPassword`] is
//! returned. [`IntakeCoordinator::submit_password`] or
//! [`IntakeCoordinator::cancel`] resolves the prompt and resumes the stash.
//! Two protected files in one batch are prompted for one after the other.
//!
//! Files are committed only once their thumbnails exist, so the workspace
//! never holds a file without page references.

use crate::config::UnlockConfig;
use crate::engine::{PdfEngine, SourceDocument};
use crate::error::{AssemblyError, FlattenError, LoadError, UnlockError};
use crate::output::UnlockMethod;
use crate::pipeline::decrypt::decrypt;
use crate::pipeline::flatten::{CancelFlag, Flattener};
use crate::pipeline::loader::open_once;
use crate::pipeline::render::Rasterizer;
use crate::pipeline::thumbnail::generate_thumbnails;
use crate::progress::{Operation, OperationGuard, ProgressTracker};
use crate::workspace::{SourceFile, Workspace};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info, warn};

/// A pending password prompt.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockAttempt {
    /// Position of the file within its batch.
    pub file_index: usize,
    pub file_name: String,
    /// The last password tried, for pre-filling the prompt.
    pub password_guess: Option<String>,
    pub force_flatten: bool,
    /// Why the last submission failed.
    pub last_error: Option<String>,
}

impl fmt::Debug for UnlockAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockAttempt")
            .field("file_index", &self.file_index)
            .field("file_name", &self.file_name)
            .field("password_guess", &self.password_guess.as_ref().map(|_| "<redacted>"))
            .field("force_flatten", &self.force_flatten)
            .field("last_error", &self.last_error)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeState {
    Idle,
    CheckingFile { file_name: String },
    AwaitingUserPassword(UnlockAttempt),
    Done,
}

/// Transitions taken for a file, kept for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStep {
    CheckingFile,
    NotEncrypted,
    TryingEmptyPassword,
    AutoFlattening,
    AwaitingUserPassword,
    Decrypting,
    ForceFlattening,
    Committed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedFile {
    /// Index in the workspace.
    pub file_index: usize,
    pub file_name: String,
    pub method: UnlockMethod,
    pub page_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeReport {
    pub committed: Vec<CommittedFile>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    Completed(IntakeReport),
    AwaitingPassword(UnlockAttempt),
}

enum FileOutcome {
    Committed(CommittedFile),
    Skipped(SkippedFile),
    NeedsPassword { file: SourceFile, error: String },
}

/// Drives batch intake against one engine and one progress tracker.
///
/// The tracker is held for [`Operation::Intake`] from `ingest` until the
/// batch completes, including while a password prompt is pending.
pub struct IntakeCoordinator<'e, E> {
    engine: &'e E,
    tracker: &'e ProgressTracker,
    config: UnlockConfig,
    cancel: Option<CancelFlag>,
    state: IntakeState,
    queue: VecDeque<(usize, SourceFile)>,
    pending: Option<(usize, SourceFile)>,
    report: IntakeReport,
    trail: Vec<(String, IntakeStep)>,
    operation: Option<OperationGuard<'e>>,
}

impl<'e, E: PdfEngine> IntakeCoordinator<'e, E> {
    pub fn new(engine: &'e E, tracker: &'e ProgressTracker, config: UnlockConfig) -> Self {
        Self {
            engine,
            tracker,
            config,
            cancel: None,
            state: IntakeState::Idle,
            queue: VecDeque::new(),
            pending: None,
            report: IntakeReport::default(),
            trail: Vec::new(),
            operation: None,
        }
    }

    /// Abort in-flight flattening when `flag` is raised.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn state(&self) -> &IntakeState {
        &self.state
    }

    pub fn pending_attempt(&self) -> Option<&UnlockAttempt> {
        match &self.state {
            IntakeState::AwaitingUserPassword(attempt) => Some(attempt),
            _ => None,
        }
    }

    /// Files stashed behind the pending prompt.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Every `(file name, step)` taken since the last `ingest`.
    pub fn trail(&self) -> &[(String, IntakeStep)] {
        &self.trail
    }

    /// Start intake of `files`, in order.
    pub fn ingest(&mut self, workspace: &mut Workspace, files: Vec<SourceFile>) -> Result<IntakeOutcome, UnlockError> {
        if let IntakeState::AwaitingUserPassword(attempt) = &self.state {
            return Err(UnlockError::AwaitingPassword {
                file_name: attempt.file_name.clone(),
            });
        }
        self.operation = Some(self.tracker.begin(Operation::Intake)?);
        info!("Starting intake of {} files", files.len());
        self.queue = files.into_iter().enumerate().collect();
        self.report = IntakeReport::default();
        self.trail.clear();
        self.resume(workspace)
    }

    /// Answer the pending prompt.
    ///
    /// With `force` the file is flattened at the force scale. Otherwise a
    /// lossless copy is tried first and flattening is the fallback. On
    /// failure the prompt is re-issued with `last_error` set.
    pub fn submit_password(
        &mut self,
        workspace: &mut Workspace,
        password: &str,
        force: bool,
    ) -> Result<IntakeOutcome, UnlockError> {
        let mut attempt = self.pending_attempt().cloned().ok_or(UnlockError::NotAwaitingPassword)?;
        let (batch_index, file) = self.pending.take().ok_or(UnlockError::NotAwaitingPassword)?;

        self.state = IntakeState::CheckingFile {
            file_name: file.name.clone(),
        };
        let step = if force {
            IntakeStep::ForceFlattening
        } else {
            IntakeStep::Decrypting
        };
        self.step(&file.name, step);

        match self.unlock_with_password(&file, password, force) {
            Ok((bytes, method)) => {
                let outcome = match self.commit(workspace, file.with_bytes(bytes), method) {
                    Ok(outcome) => outcome,
                    Err(e) => return Err(self.abort(e)),
                };
                self.record(outcome);
                self.resume(workspace)
            }
            Err(error) => {
                warn!("Unlocking '{}' with the supplied password failed: {}", file.name, error);
                attempt.password_guess = Some(password.to_string());
                attempt.force_flatten = force;
                attempt.last_error = Some(error);
                self.step(&file.name, IntakeStep::AwaitingUserPassword);
                self.pending = Some((batch_index, file));
                self.state = IntakeState::AwaitingUserPassword(attempt.clone());
                Ok(IntakeOutcome::AwaitingPassword(attempt))
            }
        }
    }

    /// Dismiss the pending prompt: skip the file and resume the batch.
    pub fn cancel(&mut self, workspace: &mut Workspace) -> Result<IntakeOutcome, UnlockError> {
        let attempt = self.pending_attempt().cloned().ok_or(UnlockError::NotAwaitingPassword)?;
        self.pending = None;
        info!("Password prompt for '{}' cancelled; skipping", attempt.file_name);
        let reason = match attempt.last_error {
            Some(e) => format!("password prompt cancelled after: {e}"),
            None => "password prompt cancelled".to_string(),
        };
        self.record(FileOutcome::Skipped(SkippedFile {
            file_name: attempt.file_name,
            reason,
        }));
        self.resume(workspace)
    }

    fn resume(&mut self, workspace: &mut Workspace) -> Result<IntakeOutcome, UnlockError> {
        while let Some((batch_index, file)) = self.queue.pop_front() {
            let outcome = match self.process(workspace, file) {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.abort(e)),
            };
            match outcome {
                FileOutcome::NeedsPassword { file, error } => {
                    warn!("'{}' could not be unlocked automatically: {}", file.name, error);
                    let attempt = UnlockAttempt {
                        file_index: batch_index,
                        file_name: file.name.clone(),
                        password_guess: None,
                        force_flatten: self.config.force_unlock,
                        last_error: None,
                    };
                    self.pending = Some((batch_index, file));
                    self.state = IntakeState::AwaitingUserPassword(attempt.clone());
                    return Ok(IntakeOutcome::AwaitingPassword(attempt));
                }
                other => self.record(other),
            }
        }

        self.state = IntakeState::Done;
        if let Some(op) = self.operation.take() {
            op.complete();
        }
        let report = std::mem::take(&mut self.report);
        info!(
            "Intake complete: {} committed, {} skipped",
            report.committed.len(),
            report.skipped.len()
        );
        Ok(IntakeOutcome::Completed(report))
    }

    fn process(&mut self, workspace: &mut Workspace, file: SourceFile) -> Result<FileOutcome, UnlockError> {
        self.state = IntakeState::CheckingFile {
            file_name: file.name.clone(),
        };
        self.step(&file.name, IntakeStep::CheckingFile);

        let opened = open_once(self.engine, &file.bytes, None).map(|doc| doc.is_encrypted());
        match opened {
            Ok(false) => {
                self.step(&file.name, IntakeStep::NotEncrypted);
                return self.commit(workspace, file, UnlockMethod::PassThrough);
            }
            Ok(true) => {
                debug!("'{}' opens without a password but is protected", file.name);
                self.step(&file.name, IntakeStep::Decrypting);
                match self.decrypt_losslessly(&file, None) {
                    Ok(bytes) => return self.commit(workspace, file.with_bytes(bytes), UnlockMethod::Decrypted),
                    Err(e) => warn!("Lossless unlock of '{}' failed ({}); flattening instead", file.name, e),
                }
            }
            Err(LoadError::Corrupt(detail)) => {
                warn!("Skipping '{}': {}", file.name, detail);
                return Ok(FileOutcome::Skipped(SkippedFile {
                    reason: LoadError::Corrupt(detail).to_string(),
                    file_name: file.name,
                }));
            }
            Err(LoadError::Unsupported(detail)) => {
                warn!("'{}' uses unsupported security ({}); flattening", file.name, detail);
            }
            Err(_) => {
                // The flatten below opens with "" and is the empty-password attempt.
                self.step(&file.name, IntakeStep::TryingEmptyPassword);
            }
        }

        self.step(&file.name, IntakeStep::AutoFlattening);
        match self.flatten(&file, Some(""), self.config.flatten_scale) {
            Ok(bytes) => self.commit(workspace, file.with_bytes(bytes), UnlockMethod::Flattened),
            Err(e) => {
                self.step(&file.name, IntakeStep::AwaitingUserPassword);
                Ok(FileOutcome::NeedsPassword {
                    file,
                    error: e.to_string(),
                })
            }
        }
    }

    fn decrypt_losslessly(&self, file: &SourceFile, password: Option<&str>) -> Result<Vec<u8>, AssemblyError> {
        let progress = |pct: u8, msg: &str| self.report_progress(pct, msg);
        decrypt(self.engine, &file.bytes, password, &progress)
    }

    fn unlock_with_password(
        &self,
        file: &SourceFile,
        password: &str,
        force: bool,
    ) -> Result<(Vec<u8>, UnlockMethod), String> {
        let flattened = |scale: f32| {
            self.flatten(file, Some(password), scale)
                .map(|bytes| (bytes, UnlockMethod::Flattened))
                .map_err(|e| e.to_string())
        };
        if force {
            return flattened(self.config.force_flatten_scale);
        }
        match self.decrypt_losslessly(file, Some(password)) {
            Ok(bytes) => Ok((bytes, UnlockMethod::Decrypted)),
            Err(AssemblyError::Open(e)) if e.is_password_failure() => Err(e.to_string()),
            Err(e) => {
                warn!("Lossless unlock of '{}' failed ({}); flattening instead", file.name, e);
                flattened(self.config.flatten_scale)
            }
        }
    }

    fn flatten(&self, file: &SourceFile, password: Option<&str>, scale: f32) -> Result<Vec<u8>, FlattenError> {
        let mut flattener =
            Flattener::new(self.engine, scale).max_rendered_pixels(self.config.max_rendered_pixels);
        if let Some(flag) = &self.cancel {
            flattener = flattener.cancel_flag(flag.clone());
        }
        let progress = |pct: u8, msg: &str| self.report_progress(pct, msg);
        flattener.flatten(&file.bytes, password, &progress)
    }

    /// Generate thumbnails and append the file to the workspace.
    fn commit(
        &self,
        workspace: &mut Workspace,
        file: SourceFile,
        method: UnlockMethod,
    ) -> Result<FileOutcome, UnlockError> {
        let file_index = workspace.next_file_index();
        let progress = |pct: u8, msg: &str| self.report_progress(pct, msg);
        let pages = match generate_thumbnails(
            self.engine,
            &file,
            file_index,
            None,
            Rasterizer::new(self.config.max_rendered_pixels),
            self.config.thumbnail_scale,
            &progress,
        ) {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Skipping '{}': thumbnails failed: {}", file.name, e);
                return Ok(FileOutcome::Skipped(SkippedFile {
                    reason: format!("thumbnail generation failed: {e}"),
                    file_name: file.name,
                }));
            }
        };
        let page_count = pages.len();
        let file_name = file.name.clone();
        workspace.commit_file(file, pages)?;
        info!("Committed '{}' ({} pages, {:?})", file_name, page_count, method);
        Ok(FileOutcome::Committed(CommittedFile {
            file_index,
            file_name,
            method,
            page_count,
        }))
    }

    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Committed(c) => {
                self.step(&c.file_name, IntakeStep::Committed);
                self.report.committed.push(c);
            }
            FileOutcome::Skipped(s) => {
                self.step(&s.file_name, IntakeStep::Skipped);
                self.report.skipped.push(s);
            }
            FileOutcome::NeedsPassword { .. } => {}
        }
    }

    fn report_progress(&self, percent: u8, message: &str) {
        if let Some(op) = &self.operation {
            op.report(percent, message);
        }
    }

    fn step(&mut self, file_name: &str, step: IntakeStep) {
        debug!("{}: {:?}", file_name, step);
        self.trail.push((file_name.to_string(), step));
    }

    /// Drop the batch after a hard error and release the tracker.
    fn abort(&mut self, error: UnlockError) -> UnlockError {
        self.queue.clear();
        self.pending = None;
        self.state = IntakeState::Idle;
        if let Some(op) = self.operation.take() {
            op.fail(&error.to_string());
        }
        error
    }
}
