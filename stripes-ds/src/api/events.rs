//! Server-Sent Events feed of document snapshots

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use stripes_common::db::load_document;
use stripes_common::sse::snapshot_sse_stream;

use super::DocumentError;
use crate::AppState;

/// GET /api/events/*path
///
/// Sends the stored document first (`null` when there is none yet), then a
/// `snapshot` event after every write to the path.
pub async fn document_events(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, DocumentError> {
    // Join the channel before reading so no write falls between the two
    let changes = state.hub.subscribe(&path);
    let initial = load_document(&state.db, &path).await?;
    Ok(snapshot_sse_stream(path, initial, changes))
}
