//! Import run controller.
//!
//! # Responsibility
//! - Hold read-only mode for the whole run and release it on every exit path.
//! - Copy companion assets (best effort), load the document, then resolve
//!   each top-level notebook in file order.
//! - Report fractional progress and honor cancellation at every checkpoint.
//!
//! # Invariants
//! - Load failures abort before any store mutation.
//! - Committed work is a strict prefix of the incoming notebooks; nothing is
//!   rolled back across notebooks on cancellation or failure.
//! - Cancellation is reported through [`ImportStatus`], not as an error.

use crate::db::open_db;
use crate::import::assets::{copy_import_assets, AssetCopyStatus};
use crate::import::loader::{load_tree_from_path, LoadError};
use crate::import::merge::{
    MergeAction, MergeEngine, MergeError, NotebookOutcome, DEFAULT_RENAME_ATTEMPTS,
};
use crate::import::policy::{ConflictChoice, ConflictPolicy, DecisionProvider};
use crate::import::progress::{CancellationToken, ProgressSink};
use crate::import::read_only::ReadOnlyMode;
use crate::import::tree::{ImportTree, NotebookEntry};
use crate::repo::record_repo::{RecordRepository, RepoError, SqliteRecordRepository};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use uuid::Uuid;

/// Per-run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Where the `<stem>.assets` directory is copied. `None` skips the copy.
    pub asset_target_dir: Option<PathBuf>,
    /// Bound on rename title synthesis retries.
    pub rename_attempts: u32,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            asset_target_dir: None,
            rename_attempts: DEFAULT_RENAME_ATTEMPTS,
        }
    }
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Completed,
    /// The operator answered a conflict with cancel/close.
    CancelledByDecision,
    /// The cancellation token was tripped.
    CancelledBySignal,
}

impl ImportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CancelledByDecision => "cancelled_by_decision",
            Self::CancelledBySignal => "cancelled_by_signal",
        }
    }

    pub fn is_cancelled(self) -> bool {
        self != Self::Completed
    }
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub run_id: Uuid,
    pub status: ImportStatus,
    /// Number of top-level notebooks in the document.
    pub total: usize,
    /// Number of top-level notebooks fully resolved (committed or skipped).
    pub processed: usize,
    /// One entry per resolved notebook, in file order.
    pub outcomes: Vec<NotebookOutcome>,
    pub assets: AssetCopyStatus,
}

impl ImportReport {
    fn new(run_id: Uuid, total: usize, assets: AssetCopyStatus) -> Self {
        Self {
            run_id,
            status: ImportStatus::Completed,
            total,
            processed: 0,
            outcomes: Vec::new(),
            assets,
        }
    }

    /// `processed / total`, `1.0` for an empty document.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.processed as f64 / self.total as f64
    }
}

/// Fault behind [`ImportError::Unexpected`].
#[derive(Debug)]
pub enum FailureCause {
    Merge(MergeError),
    Store(RepoError),
    WorkerPanicked(String),
}

impl Display for FailureCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::WorkerPanicked(message) => write!(f, "import worker panicked: {message}"),
        }
    }
}

/// Import failures. Cancellation is not one of them.
#[derive(Debug)]
pub enum ImportError {
    /// Document could not be parsed; nothing was written.
    MalformedInput { detail: String },
    /// Document could not be read; nothing was written.
    Io(io::Error),
    /// Another import holds read-only mode.
    AlreadyRunning,
    /// Fault during traversal. The first `committed` notebooks stay applied.
    Unexpected {
        committed: usize,
        cause: FailureCause,
    },
}

impl ImportError {
    /// Stable code for `error_code=` log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedInput { .. } => "malformed_input",
            Self::Io(_) => "io_error",
            Self::AlreadyRunning => "already_running",
            Self::Unexpected { cause, .. } => match cause {
                FailureCause::Merge(err) => err.code(),
                FailureCause::Store(err) => err.code(),
                FailureCause::WorkerPanicked(_) => "worker_panicked",
            },
        }
    }
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedInput { detail } => write!(f, "malformed import document: {detail}"),
            Self::Io(err) => write!(f, "cannot read import document: {err}"),
            Self::AlreadyRunning => write!(f, "another import is already running"),
            Self::Unexpected { committed, cause } => write!(
                f,
                "import stopped after {committed} notebook(s): {cause}"
            ),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Unexpected { cause, .. } => match cause {
                FailureCause::Merge(err) => Some(err),
                FailureCause::Store(err) => Some(err),
                FailureCause::WorkerPanicked(_) => None,
            },
            _ => None,
        }
    }
}

impl From<LoadError> for ImportError {
    fn from(value: LoadError) -> Self {
        match value {
            LoadError::MalformedInput { detail } => Self::MalformedInput { detail },
            LoadError::Io(err) => Self::Io(err),
        }
    }
}

/// Import controller over one repository.
pub struct ImportService<'a, R: RecordRepository + ?Sized> {
    repo: &'a R,
    read_only: ReadOnlyMode,
    options: ImportOptions,
    processed_counter: Option<Arc<AtomicUsize>>,
}

impl<'a, R: RecordRepository + ?Sized> ImportService<'a, R> {
    pub fn new(repo: &'a R, read_only: ReadOnlyMode, options: ImportOptions) -> Self {
        Self {
            repo,
            read_only,
            options,
            processed_counter: None,
        }
    }

    /// Mirrors the processed notebook count into `counter` as the run
    /// advances, so it stays readable if the run never returns.
    pub fn with_processed_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.processed_counter = Some(counter);
        self
    }

    /// Imports the document at `path`.
    ///
    /// # Side effects
    /// - Store is read-only for other components until this returns.
    /// - Copies `<stem>.assets` next to `path` into the configured target.
    /// - Emits `import_run` start/finish events.
    pub fn import_file(
        &self,
        path: &Path,
        decisions: &mut dyn DecisionProvider,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, ImportError> {
        let run_id = Uuid::new_v4();
        let started_at = Instant::now();
        info!("event=import_run module=import status=start run_id={run_id} source=file");

        let result = self.read_only.enter().map_err(|_| ImportError::AlreadyRunning).and_then(
            |_guard| {
                progress.set_text("Import images");
                let assets = copy_import_assets(path, self.options.asset_target_dir.as_deref());
                log_asset_status(run_id, &assets);

                let tree = load_tree_from_path(path)?;
                self.merge_tree(run_id, &tree, assets, decisions, progress, cancel)
            },
        );

        log_run_finished(run_id, started_at, &result);
        result
    }

    /// Imports an already loaded tree. No asset copy is attempted.
    pub fn import_tree(
        &self,
        tree: &ImportTree,
        decisions: &mut dyn DecisionProvider,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, ImportError> {
        let run_id = Uuid::new_v4();
        let started_at = Instant::now();
        info!("event=import_run module=import status=start run_id={run_id} source=tree");

        let result = self.read_only.enter().map_err(|_| ImportError::AlreadyRunning).and_then(
            |_guard| {
                self.merge_tree(
                    run_id,
                    tree,
                    AssetCopyStatus::NotPresent,
                    decisions,
                    progress,
                    cancel,
                )
            },
        );

        log_run_finished(run_id, started_at, &result);
        result
    }

    fn merge_tree(
        &self,
        run_id: Uuid,
        tree: &ImportTree,
        assets: AssetCopyStatus,
        decisions: &mut dyn DecisionProvider,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, ImportError> {
        let mut report = ImportReport::new(run_id, tree.len(), assets);
        let engine = MergeEngine::new(self.repo, cancel)
            .with_rename_attempts(self.options.rename_attempts);
        let mut policy = ConflictPolicy::new(decisions);
        progress.set_fraction(0.0);

        for entry in &tree.notebooks {
            if cancel.is_cancelled() {
                report.status = ImportStatus::CancelledBySignal;
                break;
            }

            let existing = self
                .repo
                .find_notebook_by_title(&entry.notebook.title)
                .map_err(|err| ImportError::Unexpected {
                    committed: report.processed,
                    cause: FailureCause::Store(err),
                })?;

            let action = match existing.as_ref() {
                None => MergeAction::Add,
                Some(stored) => match policy.resolve(stored) {
                    ConflictChoice::CancelAll => {
                        report.status = ImportStatus::CancelledByDecision;
                        break;
                    }
                    ConflictChoice::Overwrite => MergeAction::Overwrite,
                    ConflictChoice::Skip => MergeAction::Skip,
                    ConflictChoice::Update => MergeAction::Update,
                    ConflictChoice::Rename => MergeAction::Rename,
                },
            };

            progress.set_text(&progress_text(action, entry));
            match engine.apply(action, existing.as_ref(), entry) {
                Ok(outcome) => {
                    info!(
                        "event=import_notebook module=import status=ok run_id={run_id} action={} notebook_id={} chapters_inserted={} notes_inserted={} notes_updated={} notes_kept={}",
                        outcome.action.as_str(),
                        outcome.notebook_id.map_or_else(|| "none".to_string(), |id| id.to_string()),
                        outcome.stats.chapters_inserted,
                        outcome.stats.notes_inserted,
                        outcome.stats.notes_updated,
                        outcome.stats.notes_kept,
                    );
                    report.outcomes.push(outcome);
                }
                Err(MergeError::Cancelled) => {
                    report.status = ImportStatus::CancelledBySignal;
                    break;
                }
                Err(err) => {
                    return Err(ImportError::Unexpected {
                        committed: report.processed,
                        cause: FailureCause::Merge(err),
                    });
                }
            }

            report.processed += 1;
            if let Some(counter) = &self.processed_counter {
                counter.store(report.processed, Ordering::SeqCst);
            }
            progress.set_fraction(report.fraction());
        }

        Ok(report)
    }
}

/// Background import job description.
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub db_path: PathBuf,
    pub import_path: PathBuf,
    pub options: ImportOptions,
}

/// Handle to an import running on its own thread.
pub struct ImportHandle {
    cancel: CancellationToken,
    processed: Arc<AtomicUsize>,
    worker: JoinHandle<Result<ImportReport, ImportError>>,
}

impl ImportHandle {
    /// Requests cancellation at the next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Notebooks resolved so far by the running import.
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    /// Waits for the run to end. A worker panic reports the notebooks
    /// resolved before it as committed.
    pub fn join(self) -> Result<ImportReport, ImportError> {
        let processed = Arc::clone(&self.processed);
        self.worker.join().unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|message| (*message).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(ImportError::Unexpected {
                committed: processed.load(Ordering::SeqCst),
                cause: FailureCause::WorkerPanicked(message),
            })
        })
    }
}

/// Runs `job` on a dedicated thread with its own store connection.
///
/// `decisions` is typically a [`crate::import::prompt::ChannelDecisionProvider`]
/// whose responder is served on the calling (interactive) thread.
pub fn spawn_import(
    job: ImportJob,
    read_only: ReadOnlyMode,
    mut decisions: impl DecisionProvider + Send + 'static,
    progress: impl ProgressSink + Send + 'static,
) -> io::Result<ImportHandle> {
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let processed = Arc::new(AtomicUsize::new(0));
    let worker_processed = Arc::clone(&processed);
    let worker = std::thread::Builder::new()
        .name("notebooks-import".to_string())
        .spawn(move || {
            let store_failure = |err: RepoError| ImportError::Unexpected {
                committed: 0,
                cause: FailureCause::Store(err),
            };
            let conn = open_db(&job.db_path).map_err(|err| store_failure(err.into()))?;
            let repo = SqliteRecordRepository::try_new(&conn).map_err(store_failure)?;
            ImportService::new(&repo, read_only, job.options)
                .with_processed_counter(worker_processed)
                .import_file(&job.import_path, &mut decisions, &progress, &worker_cancel)
        })?;

    Ok(ImportHandle {
        cancel,
        processed,
        worker,
    })
}

fn progress_text(action: MergeAction, entry: &NotebookEntry) -> String {
    let title = &entry.notebook.title;
    match action {
        MergeAction::Update => format!("Update {title}"),
        MergeAction::Skip => format!("Skip {title}"),
        MergeAction::Rename => format!("Import {title} (renamed)"),
        MergeAction::Add | MergeAction::Overwrite => format!("Import {title}"),
    }
}

fn log_asset_status(run_id: Uuid, status: &AssetCopyStatus) {
    match status {
        AssetCopyStatus::Copied(files) => {
            info!("event=import_assets module=import status=ok run_id={run_id} files={files}")
        }
        AssetCopyStatus::Failed(message) => warn!(
            "event=import_assets module=import status=error run_id={run_id} error_code=asset_copy_failed error={message}"
        ),
        AssetCopyStatus::Disabled | AssetCopyStatus::NotPresent => {}
    }
}

fn log_run_finished(
    run_id: Uuid,
    started_at: Instant,
    result: &Result<ImportReport, ImportError>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(report) if report.status.is_cancelled() => info!(
            "event=import_run module=import status=cancelled run_id={run_id} reason={} total={} processed={} duration_ms={duration_ms}",
            report.status.as_str(),
            report.total,
            report.processed,
        ),
        Ok(report) => info!(
            "event=import_run module=import status=ok run_id={run_id} total={} processed={} duration_ms={duration_ms}",
            report.total, report.processed,
        ),
        Err(err) => error!(
            "event=import_run module=import status=error run_id={run_id} duration_ms={duration_ms} error_code={} error={err}",
            err.code()
        ),
    }
}
