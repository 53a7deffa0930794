//! Core domain logic for the notebooks store.
//! Owns the Notebook → Chapter → Note model, its SQLite persistence and the
//! import reconciliation engine.

pub mod db;
pub mod import;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use import::assets::AssetCopyStatus;
pub use import::export::{export_store, write_tree, ExportError};
pub use import::loader::{load_tree, load_tree_from_path, parse_tree, LoadError};
pub use import::merge::{MergeAction, MergeError, MergeStats, NotebookOutcome};
pub use import::policy::{
    ConflictChoice, ConflictDecision, ConflictPrompt, DecisionProvider, FixedDecision,
    ScriptedDecisions,
};
pub use import::progress::{CancellationToken, LogProgress, NoopProgress, ProgressSink};
pub use import::prompt::{prompt_channel, ChannelDecisionProvider, PromptResponder};
pub use import::read_only::{ReadOnlyGuard, ReadOnlyMode};
pub use import::tree::{ChapterEntry, ImportTree, NotebookEntry};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::record::{Chapter, Note, Notebook, RecordId, RecordKind, RecordValidationError};
pub use repo::record_repo::{RecordRepository, RepoError, RepoResult, SqliteRecordRepository};
pub use service::import_service::{
    spawn_import, FailureCause, ImportError, ImportHandle, ImportJob, ImportOptions,
    ImportReport, ImportService, ImportStatus,
};
pub use service::record_service::{RecordService, RecordServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
