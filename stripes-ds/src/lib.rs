//! stripes-ds library - shared document store
//!
//! Holds JSON documents by path in SQLite, applies shallow-merge writes and
//! pushes every change to subscribers as Server-Sent Events.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod cli;
pub mod hub;

use hub::DocumentHub;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub hub: DocumentHub,
    /// Held across merge and publish so subscribers see changes in commit order
    pub write_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            hub: DocumentHub::new(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let documents = Router::new()
        .route(
            "/api/documents/*path",
            get(api::get_document).post(api::post_document),
        )
        .route("/api/events/*path", get(api::document_events));

    Router::new()
        .merge(documents)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
