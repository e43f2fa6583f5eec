//! Storage crate: reorg-safe persistence of cross-layer relayed messages.
//!
//! ## Modules
//!
//! - [`error`] – Storage error types
//! - [`models`] – RelayedMsg, NewRelayedMsg, Layer, DeletionState
//! - [`config`] – StorageConfig
//! - [`relayed_msg_repo`] – RelayedMsgRepository (SQLite)
//! - [`sqlite_pool`] – SqlitePoolManager
//!
//! Soft-deleted rows are excluded from every read except
//! [`RelayedMsgRepository::get_history_by_hash`].

mod config;
mod error;
mod models;
mod relayed_msg_repo;
mod scope;
mod sqlite_pool;

#[cfg(test)]
mod relayed_msg_repo_test;

pub use config::{
    StorageConfig, DEFAULT_BUSY_TIMEOUT, DEFAULT_DATABASE_URL, DEFAULT_INSERT_CHUNK_SIZE,
    DEFAULT_MAX_CONNECTIONS,
};
pub use error::StorageError;
pub use models::{DeletionState, Layer, NewRelayedMsg, RelayedMsg};
pub use relayed_msg_repo::RelayedMsgRepository;
pub use sqlite_pool::SqlitePoolManager;
