//! Remote store adapters
//!
//! A remote store holds JSON documents by path. Writes are shallow-merge
//! upserts; subscribers receive the full document after every change,
//! including changes they wrote themselves. Every subscription opens with
//! the current state, which is `Value::Null` when the document does not
//! exist yet.

mod http;
mod memory;

pub use http::{HttpStore, SNAPSHOT_EVENT};
pub use memory::MemoryStore;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};

use crate::{Error, Result};

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Shallow-merge `patch` into the document at `path`, creating it if needed
    async fn write(&self, path: &str, patch: Value) -> Result<()>;

    /// Stream of full documents at `path`. The current document is
    /// delivered first, as `Value::Null` when there is none yet. Dropping
    /// the subscription unsubscribes.
    async fn subscribe(&self, path: &str) -> Result<Subscription>;
}

/// Live feed of snapshots for one document
pub struct Subscription {
    path: String,
    snapshots: BoxStream<'static, Value>,
}

impl Subscription {
    pub fn new(path: impl Into<String>, snapshots: BoxStream<'static, Value>) -> Self {
        Self {
            path: path.into(),
            snapshots,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Next snapshot; `None` once the store closes the feed
    pub async fn next(&mut self) -> Option<Value> {
        self.snapshots.next().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("path", &self.path).finish()
    }
}

/// Merge the top-level keys of `patch` into `target`. Keys absent from the
/// patch are kept; nested values are replaced, not merged.
pub fn shallow_merge(target: &mut Value, patch: Value) -> Result<()> {
    let Value::Object(fields) = patch else {
        return Err(Error::InvalidInput(
            "document patch must be a JSON object".to_string(),
        ));
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(existing) = target {
        existing.extend(fields);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shallow_merge_keeps_unpatched_keys() {
        let mut doc = json!({ "students": [1], "songs": [2], "sortPreference": "name-asc" });
        shallow_merge(&mut doc, json!({ "songs": [], "lastUpdated": "now" })).unwrap();
        assert_eq!(
            doc,
            json!({ "students": [1], "songs": [], "sortPreference": "name-asc", "lastUpdated": "now" })
        );
    }

    #[test]
    fn test_shallow_merge_replaces_nested_values() {
        let mut doc = json!({ "curriculum": { "level1": [1], "level2": [2] } });
        shallow_merge(&mut doc, json!({ "curriculum": { "level1": [] } })).unwrap();
        assert_eq!(doc, json!({ "curriculum": { "level1": [] } }));
    }

    #[test]
    fn test_shallow_merge_creates_and_rejects() {
        let mut doc = Value::Null;
        shallow_merge(&mut doc, json!({ "a": 1 })).unwrap();
        assert_eq!(doc, json!({ "a": 1 }));
        assert!(shallow_merge(&mut doc, json!([1, 2])).is_err());
    }
}
