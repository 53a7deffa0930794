//! Notebook, Chapter and Note records.
//!
//! # Invariants
//! - `id` is `None` until the store assigns one and never reused afterwards.
//! - Titles must be non-blank after trim before any write.
//! - Timestamps are Unix epoch milliseconds.
//!
//! Serialized field names are camelCase to stay readable by files written by
//! older exporters (`createTime`, `updateTime`, `showOrder`, `notebookId`).

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned record identifier.
pub type RecordId = i64;

/// Top-level container. Title lookups are store-wide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub title: String,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub update_time: i64,
    #[serde(default)]
    pub show_order: i64,
}

/// Second level. Title lookups are scoped to the owning notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub notebook_id: Option<RecordId>,
    pub title: String,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub update_time: i64,
    #[serde(default)]
    pub show_order: i64,
}

/// Leaf record. Title lookups are scoped to the owning chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub notebook_id: Option<RecordId>,
    #[serde(default)]
    pub chapter_id: Option<RecordId>,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form type tag, serialized as `type`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub update_time: i64,
    #[serde(default)]
    pub show_order: i64,
}

impl Notebook {
    /// Creates an unpersisted notebook with both timestamps set to `now_ms`.
    pub fn new(title: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: None,
            title: title.into(),
            create_time: now_ms,
            update_time: now_ms,
            show_order: 0,
        }
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        validate_title(RecordKind::Notebook, &self.title)
    }
}

impl Chapter {
    /// Creates an unpersisted chapter; the parent id is filled on insert.
    pub fn new(title: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: None,
            notebook_id: None,
            title: title.into(),
            create_time: now_ms,
            update_time: now_ms,
            show_order: 0,
        }
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        validate_title(RecordKind::Chapter, &self.title)?;
        if self.notebook_id.is_none() {
            return Err(RecordValidationError::MissingParent {
                kind: RecordKind::Chapter,
                parent: "notebook_id",
            });
        }
        Ok(())
    }
}

impl Note {
    /// Creates an unpersisted note with empty body fields.
    pub fn new(title: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: None,
            notebook_id: None,
            chapter_id: None,
            title: title.into(),
            content: None,
            source: None,
            description: None,
            kind: None,
            create_time: now_ms,
            update_time: now_ms,
            show_order: 0,
        }
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        validate_title(RecordKind::Note, &self.title)?;
        if self.notebook_id.is_none() {
            return Err(RecordValidationError::MissingParent {
                kind: RecordKind::Note,
                parent: "notebook_id",
            });
        }
        if self.chapter_id.is_none() {
            return Err(RecordValidationError::MissingParent {
                kind: RecordKind::Note,
                parent: "chapter_id",
            });
        }
        Ok(())
    }

    /// Copies the mutable body of `incoming` onto this record.
    ///
    /// Identity, title, parent ids and `show_order` are left untouched.
    pub fn absorb(&mut self, incoming: &Note) {
        self.content = incoming.content.clone();
        self.source = incoming.source.clone();
        self.description = incoming.description.clone();
        self.kind = incoming.kind.clone();
        self.create_time = incoming.create_time;
        self.update_time = incoming.update_time;
    }
}

/// Record level, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Notebook,
    Chapter,
    Note,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notebook => "notebook",
            Self::Chapter => "chapter",
            Self::Note => "note",
        }
    }
}

/// Write-time validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    BlankTitle(RecordKind),
    MissingParent {
        kind: RecordKind,
        parent: &'static str,
    },
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle(kind) => write!(f, "{} title must not be blank", kind.as_str()),
            Self::MissingParent { kind, parent } => {
                write!(f, "{} requires `{parent}` before persistence", kind.as_str())
            }
        }
    }
}

impl Error for RecordValidationError {}

fn validate_title(kind: RecordKind, title: &str) -> Result<(), RecordValidationError> {
    if title.trim().is_empty() {
        return Err(RecordValidationError::BlankTitle(kind));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Chapter, Note, RecordKind, RecordValidationError};

    #[test]
    fn absorb_keeps_identity_and_order() {
        let mut existing = Note::new("Plan", 100);
        existing.id = Some(7);
        existing.notebook_id = Some(1);
        existing.chapter_id = Some(10);
        existing.show_order = 3;
        existing.content = Some("v1".to_string());

        let mut incoming = Note::new("Plan", 150);
        incoming.id = Some(99);
        incoming.show_order = 0;
        incoming.content = Some("v2".to_string());
        incoming.kind = Some("rust".to_string());

        existing.absorb(&incoming);

        assert_eq!(existing.id, Some(7));
        assert_eq!(existing.chapter_id, Some(10));
        assert_eq!(existing.show_order, 3);
        assert_eq!(existing.content.as_deref(), Some("v2"));
        assert_eq!(existing.kind.as_deref(), Some("rust"));
        assert_eq!(existing.update_time, 150);
    }

    #[test]
    fn chapter_requires_parent_before_write() {
        let chapter = Chapter::new("Q1", 0);
        assert_eq!(
            chapter.validate(),
            Err(RecordValidationError::MissingParent {
                kind: RecordKind::Chapter,
                parent: "notebook_id",
            })
        );
    }

    #[test]
    fn note_deserializes_camel_case_type_tag() {
        let note: Note = serde_json::from_str(
            r#"{"title":"Plan","type":"sql","updateTime":150,"chapterId":4}"#,
        )
        .expect("note json should parse");
        assert_eq!(note.kind.as_deref(), Some("sql"));
        assert_eq!(note.update_time, 150);
        assert_eq!(note.chapter_id, Some(4));
        assert_eq!(note.create_time, 0);
    }
}
