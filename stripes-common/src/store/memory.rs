//! In-process remote store
//!
//! Behaves like the real document store (shallow merge, echo to every
//! subscriber) and records each write with its time, which makes it the
//! store of choice for exercising sync policy under a paused tokio clock.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{shallow_merge, RemoteStore, Subscription};
use crate::{Error, Result};

const CHANNEL_CAPACITY: usize = 64;

/// A write the store accepted
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub path: String,
    pub patch: Value,
    pub at: Instant,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<String, Value>,
    channels: HashMap<String, broadcast::Sender<Value>>,
    writes: Vec<RecordedWrite>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make subsequent writes fail with `WriteFailure` (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn document(&self, path: &str) -> Option<Value> {
        self.lock().documents.get(path).cloned()
    }

    /// Every accepted write, oldest first
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }

    /// Replace a document as if another client had written it
    pub fn put_document(&self, path: &str, document: Value) {
        let mut state = self.lock();
        state.documents.insert(path.to_string(), document.clone());
        if let Some(tx) = state.channels.get(path) {
            let _ = tx.send(document);
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn write(&self, path: &str, patch: Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::WriteFailure(format!(
                "memory store rejected write to {}",
                path
            )));
        }

        let mut state = self.lock();
        let mut document = state.documents.get(path).cloned().unwrap_or(Value::Null);
        shallow_merge(&mut document, patch.clone())?;
        state.documents.insert(path.to_string(), document.clone());

        state.writes.push(RecordedWrite {
            path: path.to_string(),
            patch,
            at: Instant::now(),
        });
        if let Some(tx) = state.channels.get(path) {
            // No live receivers is fine
            let receivers = tx.send(document).unwrap_or(0);
            debug!(path, receivers, "Broadcast document change");
        }
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription> {
        // Read the current document and join the channel under one lock so
        // no write can slip between them
        let (initial, mut rx) = {
            let mut state = self.lock();
            let rx = state
                .channels
                .entry(path.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe();
            (state.documents.get(path).cloned(), rx)
        };

        let feed_path = path.to_string();
        let snapshots = async_stream::stream! {
            yield initial.unwrap_or(Value::Null);
            loop {
                match rx.recv().await {
                    Ok(document) => yield document,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(path = %feed_path, skipped, "Subscriber lagged; skipping to latest");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(Subscription::new(path, Box::pin(snapshots)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_merges_and_echoes_to_subscribers() {
        let store = MemoryStore::new();
        store.write("doc", json!({ "a": 1, "b": 2 })).await.unwrap();

        let mut sub = store.subscribe("doc").await.unwrap();
        assert_eq!(sub.next().await, Some(json!({ "a": 1, "b": 2 })));

        store.write("doc", json!({ "b": 3 })).await.unwrap();
        assert_eq!(sub.next().await, Some(json!({ "a": 1, "b": 3 })));
        assert_eq!(store.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_to_missing_document_starts_with_null() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("new").await.unwrap();
        assert_eq!(sub.next().await, Some(Value::Null));
        store.write("new", json!({ "x": true })).await.unwrap();
        assert_eq!(sub.next().await, Some(json!({ "x": true })));
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = store.write("doc", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::WriteFailure(_)));
        assert!(store.document("doc").is_none());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_non_object_patch_is_rejected() {
        let store = MemoryStore::new();
        assert!(store.write("doc", json!(5)).await.is_err());
        assert!(store.writes().is_empty());
    }
}
