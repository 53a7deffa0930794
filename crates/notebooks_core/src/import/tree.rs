//! In-memory import tree.
//!
//! An ordered list of explicit `(record, children)` pairs. Records are never
//! used as keys; their ids change when the store assigns them.

use crate::model::record::{Chapter, Note, Notebook};
use serde::{Deserialize, Serialize};

/// Ordered import/export tree. Order is file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTree {
    pub notebooks: Vec<NotebookEntry>,
}

/// One notebook with its ordered chapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookEntry {
    pub notebook: Notebook,
    #[serde(default)]
    pub chapters: Vec<ChapterEntry>,
}

/// One chapter with its ordered notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub chapter: Chapter,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl ImportTree {
    pub fn new(notebooks: Vec<NotebookEntry>) -> Self {
        Self { notebooks }
    }

    pub fn len(&self) -> usize {
        self.notebooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notebooks.is_empty()
    }

    /// First notebook entry with the given title.
    pub fn notebook(&self, title: &str) -> Option<&NotebookEntry> {
        self.notebooks
            .iter()
            .find(|entry| entry.notebook.title == title)
    }

    /// Total number of notes across all notebooks.
    pub fn note_count(&self) -> usize {
        self.notebooks
            .iter()
            .flat_map(|entry| entry.chapters.iter())
            .map(|chapter| chapter.notes.len())
            .sum()
    }
}

impl NotebookEntry {
    pub fn new(notebook: Notebook, chapters: Vec<ChapterEntry>) -> Self {
        Self { notebook, chapters }
    }

    pub fn chapter(&self, title: &str) -> Option<&ChapterEntry> {
        self.chapters
            .iter()
            .find(|entry| entry.chapter.title == title)
    }
}

impl ChapterEntry {
    pub fn new(chapter: Chapter, notes: Vec<Note>) -> Self {
        Self { chapter, notes }
    }

    pub fn note(&self, title: &str) -> Option<&Note> {
        self.notes.iter().find(|note| note.title == title)
    }
}
