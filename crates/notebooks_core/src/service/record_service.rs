//! Record use-case service.
//!
//! # Responsibility
//! - Provide create/delete/list entry points for notebooks, chapters and
//!   notes outside of import runs.
//! - Honor the read-only broadcast: writes are refused while an import holds
//!   the store.
//!
//! # Invariants
//! - Titles are trimmed and must be non-blank.
//! - Reads are always allowed.

use crate::import::now_epoch_ms;
use crate::import::read_only::ReadOnlyMode;
use crate::model::record::{Chapter, Note, Notebook, RecordId};
use crate::repo::record_repo::{RecordRepository, RepoError};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from record service operations.
#[derive(Debug)]
pub enum RecordServiceError {
    /// An import currently holds the store.
    ReadOnly,
    /// Title is blank after trim.
    InvalidTitle,
    /// A notebook or chapter with this title already exists in scope.
    DuplicateTitle(String),
    Repo(RepoError),
}

impl Display for RecordServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "store is read-only while an import is running"),
            Self::InvalidTitle => write!(f, "title must not be blank"),
            Self::DuplicateTitle(title) => write!(f, "title already in use: {title}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RecordServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for RecordServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Use-case wrapper for manual record edits.
pub struct RecordService<R: RecordRepository> {
    repo: R,
    read_only: ReadOnlyMode,
}

impl<R: RecordRepository> RecordService<R> {
    pub fn new(repo: R, read_only: ReadOnlyMode) -> Self {
        Self { repo, read_only }
    }

    /// Creates an empty notebook.
    ///
    /// # Errors
    /// - `ReadOnly` while an import runs.
    /// - `DuplicateTitle` when the title is taken.
    pub fn create_notebook(&self, title: impl Into<String>) -> Result<Notebook, RecordServiceError> {
        self.ensure_writable()?;
        let title = normalize_title(title.into())?;
        if self.repo.find_notebook_by_title(&title)?.is_some() {
            return Err(RecordServiceError::DuplicateTitle(title));
        }
        let notebook = Notebook::new(title, now_epoch_ms());
        self.repo.insert_notebook(&notebook).map_err(Into::into)
    }

    /// Creates an empty chapter under `notebook_id`.
    pub fn create_chapter(
        &self,
        notebook_id: RecordId,
        title: impl Into<String>,
    ) -> Result<Chapter, RecordServiceError> {
        self.ensure_writable()?;
        let title = normalize_title(title.into())?;
        if self.repo.find_chapter_by_title(notebook_id, &title)?.is_some() {
            return Err(RecordServiceError::DuplicateTitle(title));
        }
        let mut chapter = Chapter::new(title, now_epoch_ms());
        chapter.notebook_id = Some(notebook_id);
        self.repo.insert_chapter(&chapter).map_err(Into::into)
    }

    /// Creates one note under `chapter`.
    pub fn create_note(
        &self,
        chapter: &Chapter,
        title: impl Into<String>,
        content: Option<String>,
    ) -> Result<(), RecordServiceError> {
        self.ensure_writable()?;
        let title = normalize_title(title.into())?;
        let chapter_id = chapter
            .id
            .ok_or_else(|| RepoError::InvalidData("chapter has no id".to_string()))?;
        if self.repo.find_note_by_title(chapter_id, &title)?.is_some() {
            return Err(RecordServiceError::DuplicateTitle(title));
        }
        let mut note = Note::new(title, now_epoch_ms());
        note.notebook_id = chapter.notebook_id;
        note.chapter_id = Some(chapter_id);
        note.content = content;
        self.repo.insert_notes(&[note]).map_err(Into::into)
    }

    /// Deletes a notebook with all chapters and notes.
    pub fn delete_notebook(&self, notebook_id: RecordId) -> Result<(), RecordServiceError> {
        self.ensure_writable()?;
        self.repo
            .delete_notebook_cascade(notebook_id)
            .map_err(Into::into)
    }

    pub fn list_notebooks(&self) -> Result<Vec<Notebook>, RecordServiceError> {
        self.repo.list_notebooks().map_err(Into::into)
    }

    pub fn list_chapters(&self, notebook_id: RecordId) -> Result<Vec<Chapter>, RecordServiceError> {
        self.repo.list_chapters(notebook_id).map_err(Into::into)
    }

    pub fn list_notes(&self, chapter_id: RecordId) -> Result<Vec<Note>, RecordServiceError> {
        self.repo.list_notes(chapter_id).map_err(Into::into)
    }

    fn ensure_writable(&self) -> Result<(), RecordServiceError> {
        if self.read_only.is_active() {
            return Err(RecordServiceError::ReadOnly);
        }
        Ok(())
    }
}

fn normalize_title(value: String) -> Result<String, RecordServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RecordServiceError::InvalidTitle);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::normalize_title;

    #[test]
    fn normalize_title_trims_and_rejects_blank() {
        assert_eq!(normalize_title("  Work ".to_string()).unwrap(), "Work");
        assert!(normalize_title(" \t".to_string()).is_err());
    }
}
