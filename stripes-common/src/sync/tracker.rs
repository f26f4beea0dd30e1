//! Local change tracker
//!
//! Explicit state machine for the writer side of a session:
//!
//! | event        | from           | to     |
//! |--------------|----------------|--------|
//! | local edit   | any            | Dirty  |
//! | begin save   | Dirty          | Saving |
//! | write ok     | Saving         | Clean  |
//! | write failed | Saving         | Dirty  |
//! | reset        | any            | Clean  |
//!
//! A local edit made while a write is in flight moves `Saving` to `Dirty`;
//! the write's completion then leaves the state `Dirty` so the newer edit
//! is written next.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Clean,
    Dirty,
    Saving,
}

/// Shared handle onto one session's sync state
#[derive(Debug, Clone)]
pub struct SyncTracker {
    state: Arc<Mutex<SyncState>>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SyncState::Clean)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        // State is a plain Copy enum, so a poisoned lock still holds a valid value
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SyncState {
        *self.lock()
    }

    /// `hasLocalChanges`: edits exist that no completed write carries
    pub fn has_local_changes(&self) -> bool {
        self.state() == SyncState::Dirty
    }

    /// `isSaving`: the write carrying every local edit is in flight
    pub fn is_saving(&self) -> bool {
        self.state() == SyncState::Saving
    }

    pub fn local_edit(&self) {
        let mut state = self.lock();
        trace!(from = ?*state, "local edit");
        *state = SyncState::Dirty;
    }

    /// Dirty -> Saving. Returns `false` (and changes nothing) when there is
    /// nothing to write.
    pub fn begin_save(&self) -> bool {
        let mut state = self.lock();
        if *state == SyncState::Dirty {
            *state = SyncState::Saving;
            true
        } else {
            false
        }
    }

    pub fn write_succeeded(&self) {
        let mut state = self.lock();
        if *state == SyncState::Saving {
            *state = SyncState::Clean;
        }
    }

    pub fn write_failed(&self) {
        let mut state = self.lock();
        if *state == SyncState::Saving {
            *state = SyncState::Dirty;
        }
    }

    /// Forget all local changes (sign-out)
    pub fn reset(&self) {
        *self.lock() = SyncState::Clean;
    }
}

impl Default for SyncTracker {
    fn default() -> Self {
        Self::new()
    }
}
