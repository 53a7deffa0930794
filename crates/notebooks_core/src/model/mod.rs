//! Record model for the Notebook → Chapter → Note hierarchy.
//!
//! # Responsibility
//! - Define the three persisted record shapes shared by repository, import
//!   and export code.
//!
//! # Invariants
//! - Identifiers are assigned by the store only; `None` means "not persisted".
//! - Title is the logical key, scoped to the parent record.

pub mod record;
