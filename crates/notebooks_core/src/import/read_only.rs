//! Operation-scoped read-only mode with change broadcast.
//!
//! # Responsibility
//! - Mark the store read-only for other mutating components while an import
//!   runs.
//! - Notify subscribers on every transition.
//!
//! # Invariants
//! - At most one guard is live per [`ReadOnlyMode`] handle family.
//! - Dropping the guard always clears the flag and broadcasts `false`,
//!   including on early return, error and unwinding.

use log::info;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type Subscriber = Box<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct ReadOnlyState {
    active: AtomicBool,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// Cloneable handle to the process read-only flag.
#[derive(Clone, Default)]
pub struct ReadOnlyMode {
    state: Arc<ReadOnlyState>,
}

impl Debug for ReadOnlyMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOnlyMode")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Returned by [`ReadOnlyMode::enter`] while another guard is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOnlyBusy;

impl Display for ReadOnlyBusy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "store is already in read-only mode")
    }
}

impl Error for ReadOnlyBusy {}

impl ReadOnlyMode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Registers an observer called with the new flag value on each change.
    pub fn subscribe(&self, observer: impl Fn(bool) + Send + Sync + 'static) {
        self.state
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(observer));
    }

    /// Sets the flag and broadcasts `true`. The flag is cleared when the
    /// returned guard is dropped.
    pub fn enter(&self) -> Result<ReadOnlyGuard, ReadOnlyBusy> {
        self.state
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ReadOnlyBusy)?;
        info!("event=read_only_mode module=import status=ok active=true");
        self.publish(true);
        Ok(ReadOnlyGuard { mode: self.clone() })
    }

    fn publish(&self, active: bool) {
        let subscribers = self
            .state
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for subscriber in subscribers.iter() {
            subscriber(active);
        }
    }
}

/// Live read-only period; clears the flag on drop.
#[must_use = "read-only mode ends as soon as the guard is dropped"]
pub struct ReadOnlyGuard {
    mode: ReadOnlyMode,
}

impl Drop for ReadOnlyGuard {
    fn drop(&mut self) {
        self.mode.state.active.store(false, Ordering::SeqCst);
        info!("event=read_only_mode module=import status=ok active=false");
        self.mode.publish(false);
    }
}
