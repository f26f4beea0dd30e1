//! Debounced writer
//!
//! Coalesces a burst of local edits into one remote write. Each scheduled
//! document restarts the idle window; when the window elapses with no
//! further schedule, the latest document is written once, provided the
//! tracker still reports local changes.
//!
//! Each write carries a [`WriteScope`]. Admins write the whole document;
//! everyone else writes only the students list, so a student's progress
//! toggle cannot overwrite curriculum or library changes it never saw.
//!
//! Writes from one writer never overlap: the background task finishes a
//! write before it looks at the next schedule. Failed writes are reported
//! and left for the next schedule or an explicit [`DebouncedWriter::flush`];
//! there is no automatic retry.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::tracker::SyncTracker;
use crate::auth::Role;
use crate::events::{EventBus, SyncEvent};
use crate::model::SharedDocument;
use crate::store::RemoteStore;
use crate::{Error, Result};

/// Idle window used when none is configured
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Which top-level document keys a write carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteScope {
    /// Every key of the shared document
    Document,
    /// `students` and `lastUpdated` only
    Students,
}

impl WriteScope {
    pub fn for_role(role: &Role) -> Self {
        if role.is_admin() {
            WriteScope::Document
        } else {
            WriteScope::Students
        }
    }

    /// Shallow-merge patch for `document` limited to this scope
    pub fn patch(self, document: &SharedDocument) -> Result<Value> {
        let mut patch = serde_json::to_value(document)?;
        if let (WriteScope::Students, Value::Object(fields)) = (self, &mut patch) {
            fields.retain(|key, _| key == "students" || key == "lastUpdated");
        }
        Ok(patch)
    }
}

struct PendingWrite {
    document: Box<SharedDocument>,
    scope: WriteScope,
}

enum WriterCommand {
    Schedule(PendingWrite),
    Flush(PendingWrite, oneshot::Sender<Result<()>>),
}

/// Everything the background task needs to perform one write
struct WriteContext {
    store: Arc<dyn RemoteStore>,
    document_path: String,
    tracker: SyncTracker,
    events: EventBus,
    cancel: CancellationToken,
}

impl WriteContext {
    async fn write_now(&self, write: &PendingWrite) -> Result<()> {
        if !self.tracker.begin_save() {
            debug!(path = %self.document_path, "No local changes; skipping write");
            return Ok(());
        }

        let patch = match write.scope.patch(&write.document) {
            Ok(patch) => patch,
            Err(e) => {
                self.tracker.write_failed();
                return Err(e.into());
            }
        };

        let result = tokio::select! {
            result = self.store.write(&self.document_path, patch) => result,
            _ = self.cancel.cancelled() => {
                debug!(path = %self.document_path, "Write abandoned by cancellation");
                return Ok(());
            }
        };

        match result {
            Ok(()) => {
                self.tracker.write_succeeded();
                info!(path = %self.document_path, "Saved shared document");
                self.events.emit_lossy(SyncEvent::DocumentSaved {
                    document_path: self.document_path.clone(),
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err(e) => {
                self.tracker.write_failed();
                let message = e.to_string();
                let retriable = e.is_retriable();
                if retriable {
                    warn!(path = %self.document_path, "Failed to save shared document; kept for the next write: {}", message);
                } else {
                    error!(path = %self.document_path, "Failed to save shared document: {}", message);
                }
                self.events.emit_lossy(SyncEvent::WriteFailed {
                    document_path: self.document_path.clone(),
                    message: message.clone(),
                    retriable,
                    timestamp: Utc::now(),
                });
                Err(match e {
                    Error::WriteFailure(_) => e,
                    other => Error::WriteFailure(other.to_string()),
                })
            }
        }
    }
}

/// Handle onto a background debounce task
pub struct DebouncedWriter {
    tx: mpsc::UnboundedSender<WriterCommand>,
    cancel: CancellationToken,
    tracker: SyncTracker,
    handle: JoinHandle<()>,
}

impl DebouncedWriter {
    /// Start the writer task. Must be called from within a tokio runtime.
    pub fn spawn(
        store: Arc<dyn RemoteStore>,
        document_path: impl Into<String>,
        window: Duration,
        tracker: SyncTracker,
        events: EventBus,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let context = WriteContext {
            store,
            document_path: document_path.into(),
            tracker: tracker.clone(),
            events,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(run(context, rx, window));
        Self {
            tx,
            cancel,
            tracker,
            handle,
        }
    }

    /// Queue `document` for writing after the idle window, replacing any
    /// document already waiting and restarting the window
    pub fn schedule_write(&self, document: &SharedDocument, scope: WriteScope) {
        let write = PendingWrite {
            document: Box::new(document.clone()),
            scope,
        };
        if self.tx.send(WriterCommand::Schedule(write)).is_err() {
            warn!("Write scheduled after the writer stopped; ignoring");
        }
    }

    /// Write `document` immediately, dropping any pending scheduled write.
    /// This is the explicit retry trigger after a failed save.
    pub async fn flush(&self, document: &SharedDocument, scope: WriteScope) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let write = PendingWrite {
            document: Box::new(document.clone()),
            scope,
        };
        self.tx
            .send(WriterCommand::Flush(write, reply_tx))
            .map_err(|_| Error::WriteFailure("writer has stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::WriteFailure("writer stopped before the write finished".to_string()))?
    }

    /// Cancel any pending or in-flight write and forget local changes
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.tracker.reset();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for DebouncedWriter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    context: WriteContext,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    window: Duration,
) {
    let mut pending: Option<PendingWrite> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;

            _ = context.cancel.cancelled() => {
                if pending.is_some() {
                    debug!(path = %context.document_path, "Dropping pending write on cancel");
                }
                break;
            }

            command = rx.recv() => match command {
                Some(WriterCommand::Schedule(write)) => {
                    pending = Some(write);
                    deadline = Some(Instant::now() + window);
                }
                Some(WriterCommand::Flush(write, reply)) => {
                    pending = None;
                    deadline = None;
                    let result = context.write_now(&write).await;
                    let _ = reply.send(result);
                }
                None => break,
            },

            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                if let Some(write) = pending.take() {
                    // Failures are already logged and broadcast
                    let _ = context.write_now(&write).await;
                }
            }
        }
    }

    debug!(path = %context.document_path, "Writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn spawn_writer(store: &MemoryStore, tracker: &SyncTracker) -> DebouncedWriter {
        DebouncedWriter::spawn(
            Arc::new(store.clone()),
            "doc",
            DEFAULT_DEBOUNCE,
            tracker.clone(),
            EventBus::new(16),
        )
    }

    #[test]
    fn test_students_scope_keeps_only_students() {
        let mut document = SharedDocument::default();
        document.last_updated = Some(Utc::now());
        let full = WriteScope::Document.patch(&document).unwrap();
        assert!(full.get("curriculum").is_some());
        assert!(full.get("songs").is_some());

        let patch = WriteScope::Students.patch(&document).unwrap();
        let mut keys: Vec<&str> = patch.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["lastUpdated", "students"]);
    }

    #[test]
    fn test_scope_for_role() {
        assert_eq!(WriteScope::for_role(&Role::Admin), WriteScope::Document);
        assert_eq!(
            WriteScope::for_role(&Role::LinkedStudent("s".into())),
            WriteScope::Students
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_tracker_skips_write() {
        let store = MemoryStore::new();
        let tracker = SyncTracker::new();
        let writer = spawn_writer(&store, &tracker);

        writer.schedule_write(&SharedDocument::default(), WriteScope::Document);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(store.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_immediately() {
        let store = MemoryStore::new();
        let tracker = SyncTracker::new();
        let writer = spawn_writer(&store, &tracker);

        tracker.local_edit();
        writer.schedule_write(&SharedDocument::default(), WriteScope::Document);
        writer.flush(&SharedDocument::default(), WriteScope::Document).await.unwrap();
        assert_eq!(store.writes().len(), 1);
        assert_eq!(tracker.state(), crate::sync::SyncState::Clean);

        // The pending scheduled write was superseded by the flush
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_writer() {
        let store = MemoryStore::new();
        let tracker = SyncTracker::new();
        let writer = spawn_writer(&store, &tracker);

        tracker.local_edit();
        writer.schedule_write(&SharedDocument::default(), WriteScope::Document);
        writer.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(store.writes().is_empty());
        assert!(!tracker.has_local_changes());
        assert!(!writer.is_running());
        assert!(writer.flush(&SharedDocument::default(), WriteScope::Document).await.is_err());
    }
}
