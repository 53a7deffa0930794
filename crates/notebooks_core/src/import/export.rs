//! Store snapshot in the canonical import document format.
//!
//! An exported file re-imports without loss of titles, bodies, timestamps or
//! order; identifiers are written but ignored on import.

use crate::import::loader::IMPORT_FORMAT_VERSION;
use crate::import::tree::{ChapterEntry, ImportTree, NotebookEntry};
use crate::model::record::RecordId;
use crate::repo::record_repo::{RecordRepository, RepoError};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{self, Write};

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: u32,
    notebooks: &'a [NotebookEntry],
}

/// Export failures.
#[derive(Debug)]
pub enum ExportError {
    Repo(RepoError),
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "cannot write export: {err}"),
            Self::Json(err) => write!(f, "cannot encode export: {err}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
        }
    }
}

impl From<RepoError> for ExportError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<io::Error> for ExportError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(value: serde_json::Error) -> Self {
        if value.is_io() {
            return Self::Io(value.into());
        }
        Self::Json(value)
    }
}

/// Reads the whole store into an ordered tree.
pub fn export_store<R: RecordRepository + ?Sized>(repo: &R) -> Result<ImportTree, ExportError> {
    let mut notebooks = Vec::new();
    for notebook in repo.list_notebooks()? {
        let notebook_id = required_id(notebook.id)?;
        let mut chapters = Vec::new();
        for chapter in repo.list_chapters(notebook_id)? {
            let notes = repo.list_notes(required_id(chapter.id)?)?;
            chapters.push(ChapterEntry::new(chapter, notes));
        }
        notebooks.push(NotebookEntry::new(notebook, chapters));
    }
    Ok(ImportTree::new(notebooks))
}

/// Writes `tree` as a pretty-printed canonical document.
pub fn write_tree(tree: &ImportTree, mut writer: impl Write) -> Result<(), ExportError> {
    let document = DocumentRef {
        version: IMPORT_FORMAT_VERSION,
        notebooks: &tree.notebooks,
    };
    serde_json::to_writer_pretty(&mut writer, &document)?;
    writer.flush()?;
    Ok(())
}

fn required_id(id: Option<RecordId>) -> Result<RecordId, ExportError> {
    id.ok_or_else(|| {
        ExportError::Repo(RepoError::InvalidData(
            "listed record is missing its identifier".to_string(),
        ))
    })
}
