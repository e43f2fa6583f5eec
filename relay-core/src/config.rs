//! Application config: log file and store settings. Loaded from env.

use std::env;
use std::time::Duration;

use anyhow::Result;
use relay_storage::{
    StorageConfig, DEFAULT_BUSY_TIMEOUT, DEFAULT_DATABASE_URL, DEFAULT_INSERT_CHUNK_SIZE,
    DEFAULT_MAX_CONNECTIONS,
};

pub const DEFAULT_LOG_FILE: &str = "logs/relayctl.log";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// LOG_FILE
    pub log_file: String,
    /// DATABASE_URL, DB_MAX_CONNECTIONS, DB_BUSY_TIMEOUT_SECS,
    /// DB_QUERY_TIMEOUT_SECS, DB_INSERT_CHUNK_SIZE
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load from environment variables. `database_url` overrides DATABASE_URL if provided.
    /// Numeric values that fail to parse fall back to their defaults.
    pub fn load(database_url: Option<String>) -> Result<Self> {
        let database_url = database_url
            .or_else(|| env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let log_file = env::var("LOG_FILE").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());

        let storage = StorageConfig {
            database_url,
            max_connections: parse_env("DB_MAX_CONNECTIONS").unwrap_or(DEFAULT_MAX_CONNECTIONS),
            busy_timeout: parse_env("DB_BUSY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_BUSY_TIMEOUT),
            query_timeout: parse_env("DB_QUERY_TIMEOUT_SECS").map(Duration::from_secs),
            insert_chunk_size: parse_env("DB_INSERT_CHUNK_SIZE")
                .unwrap_or(DEFAULT_INSERT_CHUNK_SIZE),
        };

        Ok(Self { log_file, storage })
    }

    /// Validate config. Call after load() to fail fast before opening the store.
    pub fn validate(&self) -> Result<()> {
        if self.storage.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL is set but empty");
        }
        if self.storage.max_connections == 0 {
            anyhow::bail!("DB_MAX_CONNECTIONS must be at least 1");
        }
        Ok(())
    }

    pub fn database_url(&self) -> &str {
        &self.storage.database_url
    }
    pub fn log_file(&self) -> &str {
        &self.log_file
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
