//! Sync session for one signed-in client
//!
//! Owns the gateway, the reconciler and the debounced writer for a single
//! shared document. Accepted mutations schedule a write; incoming
//! snapshots pass through the reconciler before they replace local state.
//! The role is resolved when the session starts and again after every
//! applied snapshot, since linking a student changes it.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::{AuthorizationPolicy, Role};
use crate::events::{EventBus, SyncEvent};
use crate::gateway::MutationGateway;
use crate::levels::LevelOrder;
use crate::model::{SharedDocument, UserAccount};
use crate::store::{RemoteStore, Subscription};
use crate::sync::{
    Decision, DebouncedWriter, ReconcileMode, SnapshotReconciler, SyncTracker, WriteScope,
    DEFAULT_DEBOUNCE,
};
use crate::Result;

/// Default location of the shared document in the remote store
pub const DEFAULT_DOCUMENT_PATH: &str = "stripes/shared";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub document_path: String,
    pub debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            document_path: DEFAULT_DOCUMENT_PATH.to_string(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

pub struct SyncSession {
    store: Arc<dyn RemoteStore>,
    document_path: String,
    account: UserAccount,
    policy: AuthorizationPolicy,
    gateway: MutationGateway,
    reconciler: SnapshotReconciler,
    writer: DebouncedWriter,
    events: EventBus,
}

impl SyncSession {
    /// Start a session with an empty local document. Must be called from
    /// within a tokio runtime; the writer task starts immediately.
    pub fn start(
        store: Arc<dyn RemoteStore>,
        config: SessionConfig,
        account: UserAccount,
        policy: AuthorizationPolicy,
        levels: LevelOrder,
        events: EventBus,
    ) -> Self {
        let document = SharedDocument::empty(&levels);
        let role = policy.resolve_role(&account, &document);
        let tracker = SyncTracker::new();
        let writer = DebouncedWriter::spawn(
            Arc::clone(&store),
            config.document_path.clone(),
            config.debounce,
            tracker.clone(),
            events.clone(),
        );

        info!(user_id = %account.id, %role, path = %config.document_path, "Session started");
        Self {
            store,
            document_path: config.document_path,
            account,
            policy,
            reconciler: SnapshotReconciler::new(ReconcileMode::for_role(&role)),
            gateway: MutationGateway::new(document, role, levels, tracker),
            writer,
            events,
        }
    }

    pub fn role(&self) -> &Role {
        self.gateway.role()
    }

    pub fn document(&self) -> &SharedDocument {
        self.gateway.document()
    }

    pub fn levels(&self) -> &LevelOrder {
        self.gateway.levels()
    }

    pub fn tracker(&self) -> &SyncTracker {
        self.gateway.tracker()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn account(&self) -> &UserAccount {
        &self.account
    }

    pub fn document_path(&self) -> &str {
        &self.document_path
    }

    pub fn reconcile_mode(&self) -> ReconcileMode {
        self.reconciler.mode()
    }

    pub fn write_scope(&self) -> WriteScope {
        WriteScope::for_role(self.gateway.role())
    }

    /// Run one or more gateway operations. A write is scheduled when any
    /// of them changed the document, even if a later one failed. Only
    /// admins write the whole document; other roles write `students`.
    pub fn mutate<T>(&mut self, f: impl FnOnce(&mut MutationGateway) -> Result<T>) -> Result<T> {
        let before = self.gateway.revision();
        let result = f(&mut self.gateway);
        if self.gateway.revision() != before {
            self.writer
                .schedule_write(self.gateway.document(), self.write_scope());
        }
        result
    }

    /// Open a new subscription; its first snapshot is applied unconditionally
    pub async fn subscribe(&mut self) -> Result<Subscription> {
        let subscription = self.store.subscribe(&self.document_path).await?;
        self.reconciler.resubscribed();
        Ok(subscription)
    }

    /// Route one incoming snapshot through the reconciler. A `null`
    /// snapshot means the document does not exist yet: it counts as the
    /// bootstrap but leaves local state as it is.
    pub fn apply_snapshot(&mut self, snapshot: Value) -> Result<Decision> {
        let missing = snapshot.is_null();
        let mut document: SharedDocument = if missing {
            SharedDocument::default()
        } else {
            serde_json::from_value(snapshot)?
        };
        let bootstrap = !self.reconciler.initial_load_complete();

        if self.reconciler.reconcile(self.gateway.tracker()) == Decision::Discard {
            self.events.emit_lossy(SyncEvent::SnapshotDiscarded {
                document_path: self.document_path.clone(),
                timestamp: Utc::now(),
            });
            return Ok(Decision::Discard);
        }

        if missing {
            debug!(path = %self.document_path, "No stored document yet; keeping local state");
        } else {
            for level in self.gateway.levels().ids() {
                document.curriculum.entry(level.to_string()).or_default();
            }
            self.gateway.replace_document(document);
            self.refresh_role();
        }

        self.events.emit_lossy(SyncEvent::SnapshotApplied {
            document_path: self.document_path.clone(),
            bootstrap,
            timestamp: Utc::now(),
        });
        Ok(Decision::Apply)
    }

    /// Wait for the next snapshot and apply it. `None` when the
    /// subscription has ended.
    pub async fn next_snapshot(&mut self, subscription: &mut Subscription) -> Result<Option<Decision>> {
        match subscription.next().await {
            Some(snapshot) => self.apply_snapshot(snapshot).map(Some),
            None => {
                warn!(path = %self.document_path, "Subscription ended");
                Ok(None)
            }
        }
    }

    /// Replace the account record (after approval or denial) and re-resolve the role
    pub fn update_account(&mut self, account: UserAccount) {
        self.account = account;
        self.refresh_role();
    }

    fn refresh_role(&mut self) {
        let role = self.policy.resolve_role(&self.account, self.gateway.document());
        if &role != self.gateway.role() {
            info!(user_id = %self.account.id, from = %self.gateway.role(), to = %role, "Role changed");
            self.reconciler.set_mode(ReconcileMode::for_role(&role));
            self.gateway.set_role(role);
        }
    }

    /// Write the current document now, dropping any pending scheduled write
    pub async fn flush(&self) -> Result<()> {
        self.writer
            .flush(self.gateway.document(), self.write_scope())
            .await
    }

    /// End the session. Unsaved edits are dropped, not flushed.
    pub fn sign_out(self) {
        let tracker = self.gateway.tracker();
        let discarded_changes = tracker.has_local_changes() || tracker.is_saving();
        self.writer.cancel();

        if discarded_changes {
            warn!(path = %self.document_path, "Signing out with unsaved changes");
        }
        info!(user_id = %self.account.id, "Session ended");
        self.events.emit_lossy(SyncEvent::SessionEnded {
            document_path: self.document_path.clone(),
            discarded_changes,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AccountStatus;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn account(email: &str, status: AccountStatus) -> UserAccount {
        UserAccount {
            id: "u1".into(),
            email: email.into(),
            display_name: None,
            status,
            created_at: Utc::now(),
        }
    }

    fn start(store: &MemoryStore, account: UserAccount) -> SyncSession {
        SyncSession::start(
            Arc::new(store.clone()),
            SessionConfig::default(),
            account,
            AuthorizationPolicy::new(["teacher@example.com"]),
            LevelOrder::default(),
            EventBus::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_mutation_schedules_nothing() {
        let store = MemoryStore::new();
        let mut session = start(&store, account("kid@example.com", AccountStatus::Approved));
        assert_eq!(session.role(), &Role::ApprovedUnlinked);
        assert_eq!(session.reconcile_mode(), ReconcileMode::AlwaysApply);

        assert!(session.mutate(|gw| gw.add_student("Ada")).is_err());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(store.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_linking_upgrades_role_on_snapshot() {
        let store = MemoryStore::new();
        let mut session = start(&store, account("kid@example.com", AccountStatus::Approved));

        let snapshot = json!({
            "students": [{
                "id": "s1",
                "name": "Kid",
                "currentLevel": "level1",
                "linkedUserId": "u1",
                "dateAdded": "2026-01-01T00:00:00Z"
            }]
        });
        assert_eq!(session.apply_snapshot(snapshot).unwrap(), Decision::Apply);
        assert_eq!(session.role(), &Role::LinkedStudent("s1".into()));
        assert_eq!(session.reconcile_mode(), ReconcileMode::Guarded);
        assert!(session.document().curriculum.contains_key("level6"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_null_snapshot_completes_bootstrap_without_replacing() {
        let store = MemoryStore::new();
        let mut session = start(&store, account("teacher@example.com", AccountStatus::Approved));
        session.mutate(|gw| gw.add_student("Ada")).unwrap();

        assert_eq!(session.apply_snapshot(serde_json::Value::Null).unwrap(), Decision::Apply);
        assert_eq!(session.document().students.len(), 1);

        // Bootstrap is done, so the next snapshot is guarded
        assert_eq!(session.apply_snapshot(json!({})).unwrap(), Decision::Discard);
        assert_eq!(session.document().students.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_snapshot_keeps_bootstrap_pending() {
        let store = MemoryStore::new();
        let mut session = start(&store, account("teacher@example.com", AccountStatus::Approved));
        assert!(session.apply_snapshot(json!({ "students": 5 })).is_err());
        session.mutate(|gw| gw.add_student("Ada")).unwrap();

        // Still the bootstrap snapshot, so it applies over the local edit
        assert_eq!(session.apply_snapshot(json!({})).unwrap(), Decision::Apply);
        assert!(session.document().students.is_empty());
    }
}
