//! # Stripes Common Library
//!
//! Shared code for the Stripes progress tracker:
//! - Shared document model (students, curriculum, songs)
//! - Role resolution and the role-gated mutation gateway
//! - Sync policy: change tracking, debounced writes, snapshot reconciliation
//! - Remote store adapters (in-memory and HTTP)
//! - Export/import, configuration, events
//! - Document persistence (feature `sqlx`)

pub mod accounts;
pub mod auth;
pub mod completion;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod export;
pub mod gateway;
pub mod levels;
pub mod model;
pub mod roster;
pub mod session;
pub mod sse;
pub mod store;
pub mod sync;
pub mod uuid_utils;

pub use auth::{AuthorizationPolicy, Identity, Role};
pub use error::{Error, Result};
pub use gateway::MutationGateway;
pub use levels::LevelOrder;
pub use model::SharedDocument;
pub use session::SyncSession;
