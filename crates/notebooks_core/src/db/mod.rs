//! Store connections and schema versioning.
//!
//! # Responsibility
//! - Hand out migrated SQLite connections (file or in-memory).
//! - Classify low-level failures into stable `error_code` values for logs.
//!
//! # Invariants
//! - `PRAGMA user_version` mirrors the last applied migration.
//! - No record is read or written through a connection that failed to
//!   migrate.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Store-level failure.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl DbError {
    /// Stable code for `error_code=` log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => match err.code {
                rusqlite::ErrorCode::ConstraintViolation => "db_constraint",
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    "db_busy"
                }
                rusqlite::ErrorCode::ReadOnly | rusqlite::ErrorCode::CannotOpen => "db_unwritable",
                _ => "db_failure",
            },
            Self::Sqlite(_) => "db_failure",
            Self::UnsupportedSchemaVersion { .. } => "db_schema_too_new",
        }
    }

    /// True when a foreign-key or NOT NULL constraint rejected the write.
    pub fn is_constraint_violation(&self) -> bool {
        self.code() == "db_constraint"
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
