//! Document read and shallow-merge write

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use stripes_common::db::{load_document, merge_document};
use tracing::{error, info};

use crate::AppState;

/// GET /api/documents/*path
pub async fn get_document(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, DocumentError> {
    load_document(&state.db, &path)
        .await?
        .map(Json)
        .ok_or(DocumentError::NotFound(path))
}

/// POST /api/documents/*path
///
/// Top-level keys of the body replace those of the stored document; the
/// merged document is returned and pushed to subscribers.
pub async fn post_document(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, DocumentError> {
    let _guard = state.write_lock.lock().await;
    let document = merge_document(&state.db, &path, patch).await?;
    let receivers = state.hub.publish(&path, document.clone());
    info!(%path, receivers, "Document updated");
    Ok(Json(document))
}

#[derive(Debug)]
pub enum DocumentError {
    NotFound(String),
    InvalidPatch(String),
    Storage(String),
}

impl From<stripes_common::Error> for DocumentError {
    fn from(e: stripes_common::Error) -> Self {
        match e {
            stripes_common::Error::InvalidInput(msg) => DocumentError::InvalidPatch(msg),
            stripes_common::Error::NotFound(what) => DocumentError::NotFound(what),
            other => DocumentError::Storage(other.to_string()),
        }
    }
}

impl IntoResponse for DocumentError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            DocumentError::NotFound(path) => {
                (StatusCode::NOT_FOUND, format!("Document not found: {}", path))
            }
            DocumentError::InvalidPatch(msg) => (StatusCode::BAD_REQUEST, msg),
            DocumentError::Storage(msg) => {
                error!("Document storage error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Storage error: {}", msg))
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
