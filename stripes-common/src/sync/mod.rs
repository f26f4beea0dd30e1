//! Shared document synchronization policy
//!
//! One writer, many observers, one remote document:
//! - [`SyncTracker`] records whether local edits are unsaved or in flight
//! - [`DebouncedWriter`] turns bursts of edits into single writes
//! - [`SnapshotReconciler`] decides which incoming snapshots replace local state

pub mod reconciler;
pub mod tracker;
pub mod writer;

pub use reconciler::{Decision, ReconcileMode, SnapshotReconciler};
pub use tracker::{SyncState, SyncTracker};
pub use writer::{DebouncedWriter, WriteScope, DEFAULT_DEBOUNCE};
