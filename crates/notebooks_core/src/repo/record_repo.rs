//! Record repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide insert/find/update/delete APIs over `notebooks`, `chapters`
//!   and `notes`.
//! - Provide unit-of-work hooks so callers can apply one notebook subtree
//!   all-or-nothing.
//!
//! # Invariants
//! - Write paths call `validate()` before SQL mutations.
//! - Note batches run inside one savepoint with one prepared statement.
//! - Listing is deterministic: `show_order ASC, id ASC`.
//! - Titles are not unique; `find_*_by_title` returns the lowest id.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::record::{
    Chapter, Note, Notebook, RecordId, RecordKind, RecordValidationError,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const NOTEBOOK_SELECT_SQL: &str = "SELECT
    id,
    title,
    create_time,
    update_time,
    show_order
FROM notebooks";

const CHAPTER_SELECT_SQL: &str = "SELECT
    id,
    notebook_id,
    title,
    create_time,
    update_time,
    show_order
FROM chapters";

const NOTE_SELECT_SQL: &str = "SELECT
    id,
    notebook_id,
    chapter_id,
    title,
    content,
    source,
    description,
    type,
    create_time,
    update_time,
    show_order
FROM notes";

const UNIT_SAVEPOINT: &str = "record_unit";
const BATCH_SAVEPOINT: &str = "note_batch";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for record persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(RecordValidationError),
    Db(DbError),
    NotFound(RecordKind, RecordId),
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl RepoError {
    /// Stable code for `error_code=` log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_record",
            Self::Db(err) => err.code(),
            Self::NotFound(..) => "record_not_found",
            Self::InvalidData(_) => "invalid_data",
            Self::UninitializedConnection { .. } => "schema_mismatch",
            Self::MissingRequiredTable(_) => "missing_table",
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(kind, id) => write!(f, "{} not found: {id}", kind.as_str()),
            Self::InvalidData(message) => write!(f, "invalid record data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "record repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "record repository requires table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RecordValidationError> for RepoError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence gateway for the three-level record hierarchy.
pub trait RecordRepository {
    /// Persists one notebook and returns it with its assigned id.
    fn insert_notebook(&self, notebook: &Notebook) -> RepoResult<Notebook>;
    /// Persists one chapter and returns it with its assigned id.
    fn insert_chapter(&self, chapter: &Chapter) -> RepoResult<Chapter>;
    /// Persists all notes in one batch.
    fn insert_notes(&self, notes: &[Note]) -> RepoResult<()>;
    /// Rewrites the mutable body of already persisted notes in one batch.
    fn update_notes(&self, notes: &[Note]) -> RepoResult<()>;
    fn find_notebook_by_title(&self, title: &str) -> RepoResult<Option<Notebook>>;
    fn find_chapter_by_title(
        &self,
        notebook_id: RecordId,
        title: &str,
    ) -> RepoResult<Option<Chapter>>;
    fn find_note_by_title(&self, chapter_id: RecordId, title: &str) -> RepoResult<Option<Note>>;
    /// Deletes one notebook together with all its chapters and notes.
    fn delete_notebook_cascade(&self, notebook_id: RecordId) -> RepoResult<()>;
    fn list_notebooks(&self) -> RepoResult<Vec<Notebook>>;
    fn list_chapters(&self, notebook_id: RecordId) -> RepoResult<Vec<Chapter>>;
    fn list_notes(&self, chapter_id: RecordId) -> RepoResult<Vec<Note>>;
    /// Opens a unit of work. Units do not nest.
    fn begin_unit(&self) -> RepoResult<()>;
    /// Makes every write since `begin_unit` durable.
    fn commit_unit(&self) -> RepoResult<()>;
    /// Discards every write since `begin_unit`.
    fn rollback_unit(&self) -> RepoResult<()>;
}

/// SQLite-backed record repository.
pub struct SqliteRecordRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_record_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn insert_notebook(&self, notebook: &Notebook) -> RepoResult<Notebook> {
        notebook.validate()?;
        self.conn.execute(
            "INSERT INTO notebooks (title, create_time, update_time, show_order)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                notebook.title.as_str(),
                notebook.create_time,
                notebook.update_time,
                notebook.show_order,
            ],
        )?;

        let mut stored = notebook.clone();
        stored.id = Some(self.conn.last_insert_rowid());
        Ok(stored)
    }

    fn insert_chapter(&self, chapter: &Chapter) -> RepoResult<Chapter> {
        chapter.validate()?;
        self.conn.execute(
            "INSERT INTO chapters (notebook_id, title, create_time, update_time, show_order)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                chapter.notebook_id,
                chapter.title.as_str(),
                chapter.create_time,
                chapter.update_time,
                chapter.show_order,
            ],
        )?;

        let mut stored = chapter.clone();
        stored.id = Some(self.conn.last_insert_rowid());
        Ok(stored)
    }

    fn insert_notes(&self, notes: &[Note]) -> RepoResult<()> {
        if notes.is_empty() {
            return Ok(());
        }
        for note in notes {
            note.validate()?;
        }

        with_savepoint(self.conn, BATCH_SAVEPOINT, |conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO notes (
                    notebook_id,
                    chapter_id,
                    title,
                    content,
                    source,
                    description,
                    type,
                    create_time,
                    update_time,
                    show_order
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            )?;
            for note in notes {
                stmt.execute(params![
                    note.notebook_id,
                    note.chapter_id,
                    note.title.as_str(),
                    note.content.as_deref(),
                    note.source.as_deref(),
                    note.description.as_deref(),
                    note.kind.as_deref(),
                    note.create_time,
                    note.update_time,
                    note.show_order,
                ])?;
            }
            Ok(())
        })
    }

    fn update_notes(&self, notes: &[Note]) -> RepoResult<()> {
        if notes.is_empty() {
            return Ok(());
        }

        with_savepoint(self.conn, BATCH_SAVEPOINT, |conn| {
            let mut stmt = conn.prepare(
                "UPDATE notes
                 SET
                    content = ?1,
                    source = ?2,
                    description = ?3,
                    type = ?4,
                    create_time = ?5,
                    update_time = ?6
                 WHERE id = ?7;",
            )?;
            for note in notes {
                let id = note.id.ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "note `{}` has no id and cannot be updated",
                        note.title
                    ))
                })?;
                let changed = stmt.execute(params![
                    note.content.as_deref(),
                    note.source.as_deref(),
                    note.description.as_deref(),
                    note.kind.as_deref(),
                    note.create_time,
                    note.update_time,
                    id,
                ])?;
                if changed == 0 {
                    return Err(RepoError::NotFound(RecordKind::Note, id));
                }
            }
            Ok(())
        })
    }

    fn find_notebook_by_title(&self, title: &str) -> RepoResult<Option<Notebook>> {
        let notebook = self
            .conn
            .query_row(
                &format!("{NOTEBOOK_SELECT_SQL} WHERE title = ?1 ORDER BY id LIMIT 1;"),
                [title],
                parse_notebook_row,
            )
            .optional()?;
        Ok(notebook)
    }

    fn find_chapter_by_title(
        &self,
        notebook_id: RecordId,
        title: &str,
    ) -> RepoResult<Option<Chapter>> {
        let chapter = self
            .conn
            .query_row(
                &format!("{CHAPTER_SELECT_SQL} WHERE notebook_id = ?1 AND title = ?2 ORDER BY id LIMIT 1;"),
                params![notebook_id, title],
                parse_chapter_row,
            )
            .optional()?;
        Ok(chapter)
    }

    fn find_note_by_title(&self, chapter_id: RecordId, title: &str) -> RepoResult<Option<Note>> {
        let note = self
            .conn
            .query_row(
                &format!("{NOTE_SELECT_SQL} WHERE chapter_id = ?1 AND title = ?2 ORDER BY id LIMIT 1;"),
                params![chapter_id, title],
                parse_note_row,
            )
            .optional()?;
        Ok(note)
    }

    fn delete_notebook_cascade(&self, notebook_id: RecordId) -> RepoResult<()> {
        with_savepoint(self.conn, "notebook_delete", |conn| {
            // Explicit child deletes keep the cascade intact on connections
            // opened without `foreign_keys=ON`.
            conn.execute("DELETE FROM notes WHERE notebook_id = ?1;", [notebook_id])?;
            conn.execute("DELETE FROM chapters WHERE notebook_id = ?1;", [notebook_id])?;
            let changed = conn.execute("DELETE FROM notebooks WHERE id = ?1;", [notebook_id])?;
            if changed == 0 {
                return Err(RepoError::NotFound(RecordKind::Notebook, notebook_id));
            }
            Ok(())
        })
    }

    fn list_notebooks(&self) -> RepoResult<Vec<Notebook>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NOTEBOOK_SELECT_SQL} ORDER BY show_order ASC, id ASC;"))?;
        let notebooks = stmt
            .query_map([], parse_notebook_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notebooks)
    }

    fn list_chapters(&self, notebook_id: RecordId) -> RepoResult<Vec<Chapter>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CHAPTER_SELECT_SQL} WHERE notebook_id = ?1 ORDER BY show_order ASC, id ASC;"
        ))?;
        let chapters = stmt
            .query_map([notebook_id], parse_chapter_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chapters)
    }

    fn list_notes(&self, chapter_id: RecordId) -> RepoResult<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTE_SELECT_SQL} WHERE chapter_id = ?1 ORDER BY show_order ASC, id ASC;"
        ))?;
        let notes = stmt
            .query_map([chapter_id], parse_note_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    fn begin_unit(&self) -> RepoResult<()> {
        self.conn.execute_batch(&format!("SAVEPOINT {UNIT_SAVEPOINT};"))?;
        Ok(())
    }

    fn commit_unit(&self) -> RepoResult<()> {
        self.conn.execute_batch(&format!("RELEASE {UNIT_SAVEPOINT};"))?;
        Ok(())
    }

    fn rollback_unit(&self) -> RepoResult<()> {
        self.conn.execute_batch(&format!(
            "ROLLBACK TO {UNIT_SAVEPOINT}; RELEASE {UNIT_SAVEPOINT};"
        ))?;
        Ok(())
    }
}

/// Runs `work` inside a named savepoint, rolling back on error.
///
/// Savepoints nest, so this composes with an open unit of work.
fn with_savepoint<T>(
    conn: &Connection,
    name: &str,
    work: impl FnOnce(&Connection) -> RepoResult<T>,
) -> RepoResult<T> {
    conn.execute_batch(&format!("SAVEPOINT {name};"))?;
    match work(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name};"))?;
            Ok(value)
        }
        Err(err) => {
            conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))?;
            Err(err)
        }
    }
}

fn parse_notebook_row(row: &Row<'_>) -> rusqlite::Result<Notebook> {
    Ok(Notebook {
        id: Some(row.get("id")?),
        title: row.get("title")?,
        create_time: row.get("create_time")?,
        update_time: row.get("update_time")?,
        show_order: row.get("show_order")?,
    })
}

fn parse_chapter_row(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    Ok(Chapter {
        id: Some(row.get("id")?),
        notebook_id: Some(row.get("notebook_id")?),
        title: row.get("title")?,
        create_time: row.get("create_time")?,
        update_time: row.get("update_time")?,
        show_order: row.get("show_order")?,
    })
}

fn parse_note_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: Some(row.get("id")?),
        notebook_id: Some(row.get("notebook_id")?),
        chapter_id: Some(row.get("chapter_id")?),
        title: row.get("title")?,
        content: row.get("content")?,
        source: row.get("source")?,
        description: row.get("description")?,
        kind: row.get("type")?,
        create_time: row.get("create_time")?,
        update_time: row.get("update_time")?,
        show_order: row.get("show_order")?,
    })
}

fn ensure_record_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["notebooks", "chapters", "notes"] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
