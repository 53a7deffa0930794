//! Persistence gateway contracts and the SQLite implementation.
//!
//! # Responsibility
//! - Define the record store contract consumed by services and the import
//!   engine.
//! - Isolate SQL details from merge orchestration.
//!
//! # Invariants
//! - Repository writes enforce record validation before persistence.
//! - Identifiers are assigned here and nowhere else.

pub mod record_repo;
