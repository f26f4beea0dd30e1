//! Per-document change fan-out

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

/// One broadcast channel per document path, created on first subscribe
#[derive(Clone, Default)]
pub struct DocumentHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Value>>>>,
}

impl DocumentHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<Value>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, path: &str) -> broadcast::Receiver<Value> {
        self.lock()
            .entry(path.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send the full document to current subscribers; returns how many got it
    pub fn publish(&self, path: &str, document: Value) -> usize {
        let mut channels = self.lock();
        let Some(tx) = channels.get(path) else {
            return 0;
        };
        match tx.send(document) {
            Ok(receivers) => {
                debug!(path, receivers, "Published document change");
                receivers
            }
            Err(_) => {
                // Everyone left; recreate on the next subscribe
                channels.remove(path);
                0
            }
        }
    }

    pub fn subscriber_count(&self, path: &str) -> usize {
        self.lock().get(path).map_or(0, |tx| tx.receiver_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_path_subscribers_only() {
        let hub = DocumentHub::new();
        let mut a = hub.subscribe("a");
        let _b = hub.subscribe("b");

        assert_eq!(hub.publish("a", json!({ "n": 1 })), 1);
        assert_eq!(a.recv().await.unwrap(), json!({ "n": 1 }));
        assert_eq!(hub.publish("missing", json!({})), 0);
    }

    #[test]
    fn test_abandoned_channel_is_dropped() {
        let hub = DocumentHub::new();
        drop(hub.subscribe("a"));
        assert_eq!(hub.publish("a", json!({})), 0);
        assert_eq!(hub.subscriber_count("a"), 0);
    }
}
