//! Cooperative cancellation and progress reporting.
//!
//! # Invariants
//! - Cancellation is a one-way latch; once tripped it stays tripped.
//! - Progress fractions are within `0.0..=1.0`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation latch checked at every import checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Safe to call from any thread, any number of times.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Receiver of import progress. Every method defaults to a no-op.
pub trait ProgressSink {
    /// Short status line, e.g. `Import Work`.
    fn set_text(&self, _text: &str) {}
    /// Fraction of top-level notebooks resolved so far.
    fn set_fraction(&self, _fraction: f64) {}
}

/// Progress sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}

/// Progress sink that forwards to the `log` facade at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn set_text(&self, text: &str) {
        log::debug!("event=import_progress module=import text_len={}", text.len());
    }

    fn set_fraction(&self, fraction: f64) {
        log::debug!("event=import_progress module=import fraction={fraction:.3}");
    }
}

#[cfg(test)]
mod tests {
    use super::CancellationToken;

    #[test]
    fn clones_share_one_latch() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());

        token.cancel();
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
