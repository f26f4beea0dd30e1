//! Server-Sent Events (SSE) utilities
//!
//! Document feeds are sent as `snapshot` events whose data is the full
//! document JSON, the format `HttpStore` reads back.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::Value;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat")
}

fn snapshot_event(document: &Value) -> Event {
    Event::default()
        .event(crate::store::SNAPSHOT_EVENT)
        .data(document.to_string())
}

/// Stream `initial` and then every broadcast change. A missing document
/// opens the feed with a `null` snapshot. A lagging client skips ahead to
/// the newest document.
pub fn snapshot_sse_stream(
    path: String,
    initial: Option<Value>,
    mut changes: broadcast::Receiver<Value>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(%path, "SSE client subscribed");

    let stream = async_stream::stream! {
        yield Ok(snapshot_event(&initial.unwrap_or(Value::Null)));
        loop {
            match changes.recv().await {
                Ok(document) => {
                    debug!(%path, "SSE: sending snapshot");
                    yield Ok(snapshot_event(&document));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%path, skipped, "SSE client lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!(%path, "SSE stream closed");
    };

    Sse::new(stream).keep_alive(keep_alive())
}
