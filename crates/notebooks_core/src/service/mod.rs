//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Drive whole import runs: read-only scope, asset copy, loading, conflict
//!   policy, merge, progress and cancellation.

pub mod import_service;
pub mod record_service;
