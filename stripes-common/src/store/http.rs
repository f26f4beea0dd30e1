//! HTTP client for the stripes-ds document store
//!
//! Writes are `POST /api/documents/{path}`; subscriptions read the
//! Server-Sent Events feed at `GET /api/events/{path}`.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{RemoteStore, Subscription};
use crate::{Error, Result};

/// SSE event name carrying a full document
pub const SNAPSHOT_EVENT: &str = "snapshot";

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, prefix: &str, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, prefix, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn write(&self, path: &str, patch: Value) -> Result<()> {
        let url = self.url("api/documents", path);
        let response = self
            .client
            .post(&url)
            .json(&patch)
            .send()
            .await
            .map_err(|e| Error::WriteFailure(format!("POST {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::WriteFailure(format!(
                "POST {} returned {}: {}",
                url, status, body
            )));
        }
        debug!(path, "Document written");
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription> {
        let url = self.url("api/events", path);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::Remote(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Remote(format!("GET {} returned {}", url, status)));
        }
        info!(path, "Subscribed to document events");

        let mut body = response.bytes_stream();
        let feed_path = path.to_string();
        let snapshots = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => buffer.extend_from_slice(&bytes),
                    Err(e) => {
                        warn!(path = %feed_path, "Event stream error: {}", e);
                        break;
                    }
                }
                while let Some((frame, rest)) = split_frame(&buffer) {
                    let parsed = parse_snapshot_frame(&frame);
                    buffer = rest;
                    if let Some(document) = parsed {
                        yield document;
                    }
                }
            }
            debug!(path = %feed_path, "Event stream closed");
        };

        Ok(Subscription::new(path, Box::pin(snapshots)))
    }
}

/// Split off the first complete SSE frame (terminated by a blank line)
fn split_frame(buffer: &[u8]) -> Option<(String, Vec<u8>)> {
    let normalized_end = buffer
        .windows(2)
        .position(|w| w == b"\n\n")
        .map(|pos| (pos, pos + 2));
    let crlf_end = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| (pos, pos + 4));

    let (frame_end, rest_start) = match (normalized_end, crlf_end) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };

    let frame = String::from_utf8_lossy(&buffer[..frame_end]).into_owned();
    Some((frame, buffer[rest_start..].to_vec()))
}

/// Extract the document from a `snapshot` frame; other events, comments
/// and keep-alives yield `None`
pub(crate) fn parse_snapshot_frame(frame: &str) -> Option<Value> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in frame.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value),
            "data" => data.push(value),
            _ => {}
        }
    }

    if event != Some(SNAPSHOT_EVENT) || data.is_empty() {
        return None;
    }
    match serde_json::from_str(&data.join("\n")) {
        Ok(document) => Some(document),
        Err(e) => {
            warn!("Ignoring malformed snapshot event: {}", e);
            None
        }
    }
}
