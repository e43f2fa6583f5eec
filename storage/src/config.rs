//! Store configuration: database location, pool sizing and query limits.

use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "./data/bridge_history.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
/// Rows per multi-row INSERT; keeps bind parameters well under SQLite's limit.
pub const DEFAULT_INSERT_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// SQLite database file path. Created if missing.
    pub database_url: String,
    pub max_connections: u32,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Deadline applied to every repository call; `None` waits indefinitely.
    pub query_timeout: Option<Duration>,
    pub insert_chunk_size: usize,
}

impl StorageConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn with_insert_chunk_size(mut self, size: usize) -> Self {
        self.insert_chunk_size = size;
        self
    }

    /// Chunk size actually used for batch writes (never zero).
    pub fn effective_chunk_size(&self) -> usize {
        self.insert_chunk_size.max(1)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            query_timeout: None,
            insert_chunk_size: DEFAULT_INSERT_CHUNK_SIZE,
        }
    }
}
