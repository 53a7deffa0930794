//! Three-level merge of one incoming notebook subtree into the store.
//!
//! # Responsibility
//! - Execute the resolved action (add, overwrite, skip, update, rename) for
//!   one top-level notebook.
//! - Batch note writes per chapter: one insert batch and one update batch.
//!
//! # Invariants
//! - Identifiers come from the repository; the engine only carries a freshly
//!   assigned parent id down to children.
//! - Update never touches the stored notebook's own fields.
//! - Update copies a note body only when `incoming.update_time` is strictly
//!   greater than the stored one.
//! - Every non-skip action runs inside one repository unit; on error or
//!   cancellation the unit is rolled back, so the notebook is untouched.

use crate::import::now_epoch_ms;
use crate::import::progress::CancellationToken;
use crate::import::tree::{ChapterEntry, NotebookEntry};
use crate::model::record::{Chapter, Note, Notebook, RecordId};
use crate::repo::record_repo::{RecordRepository, RepoError};
use log::{debug, warn};
use rand::Rng;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default bound on rename title synthesis attempts.
pub const DEFAULT_RENAME_ATTEMPTS: u32 = 16;

/// Action applied to one top-level notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Add,
    Overwrite,
    Skip,
    Update,
    Rename,
}

impl MergeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
            Self::Update => "update",
            Self::Rename => "rename",
        }
    }
}

/// Write counters for one notebook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub chapters_inserted: usize,
    pub notes_inserted: usize,
    pub notes_updated: usize,
    /// Stored notes left as-is because the incoming copy was not newer.
    pub notes_kept: usize,
}

/// What happened to one top-level notebook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookOutcome {
    pub action: MergeAction,
    /// Title as it exists in the store afterwards (the synthesized one for
    /// rename, the incoming one otherwise).
    pub title: String,
    /// Stored notebook id, `None` for skip.
    pub notebook_id: Option<RecordId>,
    pub stats: MergeStats,
}

/// Reasons a notebook merge stops early.
#[derive(Debug)]
pub enum MergeError {
    /// Cancellation was observed at a checkpoint.
    Cancelled,
    Repo(RepoError),
    /// No free title was found within the attempt bound.
    RenameExhausted { title: String, attempts: u32 },
    /// The action needs a stored notebook but none was supplied.
    MissingExisting(MergeAction),
}

impl MergeError {
    /// Stable code for `error_code=` log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Repo(err) => err.code(),
            Self::RenameExhausted { .. } => "rename_exhausted",
            Self::MissingExisting(_) => "missing_existing",
        }
    }
}

impl Display for MergeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "merge cancelled"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::RenameExhausted { title, attempts } => write!(
                f,
                "no free title derived from `{title}` after {attempts} attempts"
            ),
            Self::MissingExisting(action) => {
                write!(f, "{} requires an existing notebook", action.as_str())
            }
        }
    }
}

impl Error for MergeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for MergeError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

pub type MergeResult<T> = Result<T, MergeError>;

/// Merges notebook subtrees through a [`RecordRepository`].
pub struct MergeEngine<'a, R: RecordRepository + ?Sized> {
    repo: &'a R,
    cancel: &'a CancellationToken,
    rename_attempts: u32,
}

impl<'a, R: RecordRepository + ?Sized> MergeEngine<'a, R> {
    pub fn new(repo: &'a R, cancel: &'a CancellationToken) -> Self {
        Self {
            repo,
            cancel,
            rename_attempts: DEFAULT_RENAME_ATTEMPTS,
        }
    }

    pub fn with_rename_attempts(mut self, attempts: u32) -> Self {
        self.rename_attempts = attempts.max(1);
        self
    }

    /// Applies `action` to `entry` as one unit of work.
    ///
    /// `existing` is the stored notebook sharing the incoming title; it is
    /// required for overwrite, update and rename.
    pub fn apply(
        &self,
        action: MergeAction,
        existing: Option<&Notebook>,
        entry: &NotebookEntry,
    ) -> MergeResult<NotebookOutcome> {
        if action == MergeAction::Skip {
            return Ok(skipped(entry));
        }

        self.repo.begin_unit()?;
        let applied = self.apply_in_unit(action, existing, entry);
        match applied {
            Ok(outcome) => {
                self.repo.commit_unit()?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = self.repo.rollback_unit() {
                    warn!(
                        "event=import_notebook module=import status=error error_code=rollback_failed error={rollback_err}"
                    );
                }
                Err(err)
            }
        }
    }

    fn apply_in_unit(
        &self,
        action: MergeAction,
        existing: Option<&Notebook>,
        entry: &NotebookEntry,
    ) -> MergeResult<NotebookOutcome> {
        let require_existing = || existing.ok_or(MergeError::MissingExisting(action));
        let mut stats = MergeStats::default();

        let stored = match action {
            MergeAction::Add => self.add(&entry.notebook, &entry.chapters, &mut stats)?,
            MergeAction::Overwrite => {
                let existing = require_existing()?;
                self.overwrite(existing, entry, &mut stats)?
            }
            MergeAction::Rename => {
                let existing = require_existing()?;
                self.rename(existing, entry, &mut stats)?
            }
            MergeAction::Update => {
                let existing = require_existing()?;
                self.update(existing, entry, &mut stats)?;
                existing.clone()
            }
            MergeAction::Skip => return Ok(skipped(entry)),
        };

        Ok(NotebookOutcome {
            action,
            title: stored.title,
            notebook_id: stored.id,
            stats,
        })
    }

    /// Pure top-down insert of a notebook subtree.
    fn add(
        &self,
        notebook: &Notebook,
        chapters: &[ChapterEntry],
        stats: &mut MergeStats,
    ) -> MergeResult<Notebook> {
        self.checkpoint()?;
        let stored = self.repo.insert_notebook(&detached_notebook(notebook))?;
        let notebook_id = stored_id(stored.id)?;

        for chapter_entry in chapters {
            self.checkpoint()?;
            self.add_chapter(notebook_id, chapter_entry, stats)?;
        }
        Ok(stored)
    }

    /// Deletes the stored subtree, then adds the incoming one.
    fn overwrite(
        &self,
        existing: &Notebook,
        entry: &NotebookEntry,
        stats: &mut MergeStats,
    ) -> MergeResult<Notebook> {
        self.repo.delete_notebook_cascade(stored_id(existing.id)?)?;
        self.add(&entry.notebook, &entry.chapters, stats)
    }

    /// Adds the incoming subtree under a freshly synthesized title.
    fn rename(
        &self,
        existing: &Notebook,
        entry: &NotebookEntry,
        stats: &mut MergeStats,
    ) -> MergeResult<Notebook> {
        let mut renamed = entry.notebook.clone();
        renamed.title = self.synthesize_title(&existing.title)?;
        self.add(&renamed, &entry.chapters, stats)
    }

    /// Reconciles incoming chapters and notes into the stored notebook.
    fn update(
        &self,
        existing: &Notebook,
        entry: &NotebookEntry,
        stats: &mut MergeStats,
    ) -> MergeResult<()> {
        let notebook_id = stored_id(existing.id)?;

        for chapter_entry in &entry.chapters {
            self.checkpoint()?;
            let stored_chapter = self
                .repo
                .find_chapter_by_title(notebook_id, &chapter_entry.chapter.title)?;

            let Some(stored_chapter) = stored_chapter else {
                self.add_chapter(notebook_id, chapter_entry, stats)?;
                continue;
            };
            let chapter_id = stored_id(stored_chapter.id)?;

            let mut inserts = Vec::new();
            let mut updates = Vec::new();
            for incoming in &chapter_entry.notes {
                self.checkpoint()?;
                match self.repo.find_note_by_title(chapter_id, &incoming.title)? {
                    Some(mut stored_note) if incoming.update_time > stored_note.update_time => {
                        stored_note.absorb(incoming);
                        updates.push(stored_note);
                    }
                    Some(_) => stats.notes_kept += 1,
                    None => inserts.push(attached_note(incoming, notebook_id, chapter_id)),
                }
            }

            self.checkpoint()?;
            self.repo.update_notes(&updates)?;
            self.repo.insert_notes(&inserts)?;
            stats.notes_updated += updates.len();
            stats.notes_inserted += inserts.len();
            debug!(
                "event=import_chapter module=import status=ok mode=update chapter_id={chapter_id} inserted={} updated={}",
                inserts.len(),
                updates.len()
            );
        }
        Ok(())
    }

    /// Inserts one chapter under `notebook_id` and all of its notes.
    fn add_chapter(
        &self,
        notebook_id: RecordId,
        chapter_entry: &ChapterEntry,
        stats: &mut MergeStats,
    ) -> MergeResult<()> {
        let mut chapter = detached_chapter(&chapter_entry.chapter);
        chapter.notebook_id = Some(notebook_id);
        let stored = self.repo.insert_chapter(&chapter)?;
        let chapter_id = stored_id(stored.id)?;
        stats.chapters_inserted += 1;

        let notes: Vec<Note> = chapter_entry
            .notes
            .iter()
            .map(|note| attached_note(note, notebook_id, chapter_id))
            .collect();
        self.checkpoint()?;
        self.repo.insert_notes(&notes)?;
        stats.notes_inserted += notes.len();
        Ok(())
    }

    /// `<base>_<epoch ms><100..=999>`, redrawn until no stored notebook uses it.
    fn synthesize_title(&self, base: &str) -> MergeResult<String> {
        let mut rng = rand::thread_rng();
        for _ in 0..self.rename_attempts {
            let candidate = format!(
                "{base}_{}{}",
                now_epoch_ms(),
                rng.gen_range(100..=999)
            );
            if self.repo.find_notebook_by_title(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }
        Err(MergeError::RenameExhausted {
            title: base.to_string(),
            attempts: self.rename_attempts,
        })
    }

    fn checkpoint(&self) -> MergeResult<()> {
        if self.cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }
        Ok(())
    }
}

fn skipped(entry: &NotebookEntry) -> NotebookOutcome {
    NotebookOutcome {
        action: MergeAction::Skip,
        title: entry.notebook.title.clone(),
        notebook_id: None,
        stats: MergeStats::default(),
    }
}

fn stored_id(id: Option<RecordId>) -> MergeResult<RecordId> {
    id.ok_or_else(|| {
        MergeError::Repo(RepoError::InvalidData(
            "stored record is missing its identifier".to_string(),
        ))
    })
}

fn detached_notebook(notebook: &Notebook) -> Notebook {
    Notebook {
        id: None,
        ..notebook.clone()
    }
}

fn detached_chapter(chapter: &Chapter) -> Chapter {
    Chapter {
        id: None,
        notebook_id: None,
        ..chapter.clone()
    }
}

fn attached_note(note: &Note, notebook_id: RecordId, chapter_id: RecordId) -> Note {
    Note {
        id: None,
        notebook_id: Some(notebook_id),
        chapter_id: Some(chapter_id),
        ..note.clone()
    }
}
