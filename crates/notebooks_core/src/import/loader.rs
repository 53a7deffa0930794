//! Import document loader.
//!
//! # Responsibility
//! - Turn a byte source into an [`ImportTree`], all-or-nothing.
//! - Accept the canonical pair-list document and the legacy keyed-object
//!   document written by older exporters.
//!
//! # Invariants
//! - No partial tree is ever returned; any failure yields an error.
//! - Input order is preserved at every level.
//! - The loader never touches the store.
//!
//! Canonical document:
//! `{"version":1,"notebooks":[{"notebook":{..},"chapters":[{"chapter":{..},"notes":[..]}]}]}`
//!
//! Legacy document: an object whose keys are JSON-encoded notebooks, whose
//! values are objects keyed by JSON-encoded chapters mapping to note arrays.

use crate::import::tree::{ChapterEntry, ImportTree, NotebookEntry};
use crate::model::record::{Chapter, Note, Notebook};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Highest canonical document version this loader understands.
pub const IMPORT_FORMAT_VERSION: u32 = 1;

/// Canonical on-disk envelope.
#[derive(Debug, Deserialize)]
struct ImportDocument {
    version: u32,
    notebooks: Vec<NotebookEntry>,
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Loader failures.
#[derive(Debug)]
pub enum LoadError {
    /// Input is not a valid import document. `detail` carries the parser
    /// diagnostic (including line/column when available).
    MalformedInput { detail: String },
    /// Source could not be read.
    Io(io::Error),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedInput { detail } => write!(f, "malformed import document: {detail}"),
            Self::Io(err) => write!(f, "cannot read import source: {err}"),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::MalformedInput { .. } => None,
        }
    }
}

impl From<io::Error> for LoadError {
    fn from(value: io::Error) -> Self {
        // Non UTF-8 bytes surface as `InvalidData` from `read_to_string`.
        if value.kind() == io::ErrorKind::InvalidData {
            return Self::MalformedInput {
                detail: value.to_string(),
            };
        }
        Self::Io(value)
    }
}

/// Loads an import tree from a file path.
pub fn load_tree_from_path(path: impl AsRef<Path>) -> LoadResult<ImportTree> {
    let file = File::open(path.as_ref()).map_err(LoadError::Io)?;
    load_tree(file)
}

/// Loads an import tree from any reader.
pub fn load_tree(mut reader: impl Read) -> LoadResult<ImportTree> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    parse_tree(&text)
}

/// Parses an import tree from document text.
pub fn parse_tree(text: &str) -> LoadResult<ImportTree> {
    let document: Value = serde_json::from_str(text).map_err(malformed)?;
    match document {
        Value::Object(map) if map.contains_key("notebooks") => parse_canonical(map),
        Value::Object(map) => parse_legacy(map),
        Value::Array(items) => {
            let notebooks: Vec<NotebookEntry> =
                serde_json::from_value(Value::Array(items)).map_err(malformed)?;
            Ok(ImportTree::new(notebooks))
        }
        other => Err(LoadError::MalformedInput {
            detail: format!(
                "expected an object or array at document root, found {}",
                value_kind(&other)
            ),
        }),
    }
}

fn parse_canonical(map: Map<String, Value>) -> LoadResult<ImportTree> {
    let document: ImportDocument =
        serde_json::from_value(Value::Object(map)).map_err(malformed)?;
    if document.version > IMPORT_FORMAT_VERSION {
        return Err(LoadError::MalformedInput {
            detail: format!(
                "document version {} is newer than supported {}",
                document.version, IMPORT_FORMAT_VERSION
            ),
        });
    }
    Ok(ImportTree::new(document.notebooks))
}

fn parse_legacy(map: Map<String, Value>) -> LoadResult<ImportTree> {
    let mut notebooks = Vec::with_capacity(map.len());
    for (notebook_index, (notebook_key, chapters_value)) in map.into_iter().enumerate() {
        let notebook: Notebook = serde_json::from_str(&notebook_key).map_err(|err| {
            LoadError::MalformedInput {
                detail: format!("notebook key #{notebook_index} is not a notebook record: {err}"),
            }
        })?;

        let chapter_map = match chapters_value {
            Value::Object(chapter_map) => chapter_map,
            other => {
                return Err(LoadError::MalformedInput {
                    detail: format!(
                        "notebook `{}` must map to an object of chapters, found {}",
                        notebook.title,
                        value_kind(&other)
                    ),
                });
            }
        };

        let mut chapters = Vec::with_capacity(chapter_map.len());
        for (chapter_index, (chapter_key, notes_value)) in chapter_map.into_iter().enumerate() {
            let chapter: Chapter = serde_json::from_str(&chapter_key).map_err(|err| {
                LoadError::MalformedInput {
                    detail: format!(
                        "chapter key #{chapter_index} in notebook `{}` is not a chapter record: {err}",
                        notebook.title
                    ),
                }
            })?;
            let notes: Vec<Note> = serde_json::from_value(notes_value).map_err(|err| {
                LoadError::MalformedInput {
                    detail: format!(
                        "notes of chapter `{}` in notebook `{}`: {err}",
                        chapter.title, notebook.title
                    ),
                }
            })?;
            chapters.push(ChapterEntry::new(chapter, notes));
        }

        notebooks.push(NotebookEntry::new(notebook, chapters));
    }
    Ok(ImportTree::new(notebooks))
}

fn malformed(err: serde_json::Error) -> LoadError {
    LoadError::MalformedInput {
        detail: err.to_string(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_tree, LoadError};

    #[test]
    fn rejects_scalar_root() {
        let err = parse_tree("42").expect_err("scalar root must fail");
        match err {
            LoadError::MalformedInput { detail } => assert!(detail.contains("number")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_newer_document_version() {
        let err = parse_tree(r#"{"version":9,"notebooks":[]}"#)
            .expect_err("future version must fail");
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn empty_legacy_object_is_empty_tree() {
        let tree = parse_tree("{}").expect("empty object should parse");
        assert!(tree.is_empty());
    }
}
