//! Hierarchical import reconciliation.
//!
//! # Responsibility
//! - Load a serialized Notebook → Chapter → Note tree without touching the
//!   store.
//! - Resolve title conflicts per top-level notebook and merge the incoming
//!   tree into the store.
//! - Provide the cancellation, progress, read-only broadcast and prompt
//!   hand-off primitives the import service drives.
//!
//! # Invariants
//! - Matching is by title within the parent scope, never by identifier.
//! - Each top-level notebook is applied as one unit: fully or not at all.

pub mod assets;
pub mod export;
pub mod loader;
pub mod merge;
pub mod policy;
pub mod progress;
pub mod prompt;
pub mod read_only;
pub mod tree;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall clock in epoch milliseconds, `0` if the clock is before 1970.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
