//! HTTP API handlers for stripes-ds

pub mod documents;
pub mod events;
pub mod health;

pub use documents::{get_document, post_document, DocumentError};
pub use events::document_events;
pub use health::health_routes;
