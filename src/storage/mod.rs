//! Storage engine for the sync ledger
//!
//! Handles the SQLite connection, schema, and the repositories built on it.
//! Each repository exposes free functions over `&Connection` and matching
//! methods on [`SyncStorage`].

pub mod block_hashes;
mod connection;
mod migrations;
pub mod pending;
pub mod project_users;
pub mod projects;

pub use block_hashes::content_digest;
pub use connection::SyncStorage;
pub use migrations::SCHEMA_VERSION;
