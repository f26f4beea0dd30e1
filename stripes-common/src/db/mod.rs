//! Document persistence (SQLite)

pub mod documents;
pub mod init;

pub use documents::*;
pub use init::*;
