//! Sync event types and EventBus
//!
//! Sessions report save results and reconciliation decisions here so a UI
//! can show non-blocking notifications (for example a failed save) without
//! the mutation path ever blocking on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted by a sync session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Local changes reached the remote store
    DocumentSaved {
        document_path: String,
        timestamp: DateTime<Utc>,
    },

    /// Remote store rejected a write; local changes are kept for retry
    WriteFailed {
        document_path: String,
        message: String,
        /// Whether a later attempt could succeed
        retriable: bool,
        timestamp: DateTime<Utc>,
    },

    /// Incoming snapshot replaced local state
    SnapshotApplied {
        document_path: String,
        bootstrap: bool,
        timestamp: DateTime<Utc>,
    },

    /// Incoming snapshot dropped to protect unsaved local edits
    SnapshotDiscarded {
        document_path: String,
        timestamp: DateTime<Utc>,
    },

    /// Session signed out; pending writes were cancelled
    SessionEnded {
        document_path: String,
        discarded_changes: bool,
        timestamp: DateTime<Utc>,
    },
}

impl SyncEvent {
    /// Event name used for SSE and logging
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::DocumentSaved { .. } => "DocumentSaved",
            SyncEvent::WriteFailed { .. } => "WriteFailed",
            SyncEvent::SnapshotApplied { .. } => "SnapshotApplied",
            SyncEvent::SnapshotDiscarded { .. } => "SnapshotDiscarded",
            SyncEvent::SessionEnded { .. } => "SessionEnded",
        }
    }
}

/// Broadcast bus for [`SyncEvent`]s
///
/// Cloning yields another handle onto the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SyncEvent) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let event_type = event.event_type();
        if self.tx.send(event).is_err() {
            debug!("No subscribers for {} event", event_type);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
