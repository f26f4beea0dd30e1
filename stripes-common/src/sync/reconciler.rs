//! Snapshot reconciler
//!
//! Decides whether an incoming remote snapshot replaces local state. The
//! decision is whole-document: a guarded session with any unsaved edit
//! drops the entire snapshot, including fields another writer changed.
//! That is last-writer-wins, not a merge.

use tracing::debug;

use super::tracker::SyncTracker;
use crate::auth::Role;

/// How a session treats incoming snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Discard snapshots while local edits are unsaved or being saved
    Guarded,
    /// Apply every snapshot
    AlwaysApply,
}

impl ReconcileMode {
    /// Roles that can hold local edits are guarded; read-only roles always apply
    pub fn for_role(role: &Role) -> Self {
        if role.can_write() {
            ReconcileMode::Guarded
        } else {
            ReconcileMode::AlwaysApply
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Decision {
    Apply,
    Discard,
}

#[derive(Debug)]
pub struct SnapshotReconciler {
    mode: ReconcileMode,
    initial_load_complete: bool,
}

impl SnapshotReconciler {
    pub fn new(mode: ReconcileMode) -> Self {
        Self {
            mode,
            initial_load_complete: false,
        }
    }

    pub fn mode(&self) -> ReconcileMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ReconcileMode) {
        self.mode = mode;
    }

    pub fn initial_load_complete(&self) -> bool {
        self.initial_load_complete
    }

    /// Start a new subscription lifetime; its first snapshot bootstraps
    pub fn resubscribed(&mut self) {
        self.initial_load_complete = false;
    }

    /// Decide the fate of the next incoming snapshot
    pub fn reconcile(&mut self, tracker: &SyncTracker) -> Decision {
        if !self.initial_load_complete {
            self.initial_load_complete = true;
            debug!("Applying bootstrap snapshot");
            return Decision::Apply;
        }

        match self.mode {
            ReconcileMode::AlwaysApply => Decision::Apply,
            ReconcileMode::Guarded => {
                if tracker.is_saving() || tracker.has_local_changes() {
                    debug!(state = ?tracker.state(), "Discarding snapshot over unsaved local edits");
                    Decision::Discard
                } else {
                    Decision::Apply
                }
            }
        }
    }
}
