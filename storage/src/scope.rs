//! Query builders for the `relayed_msg` table.
//!
//! Reads, in-place updates and soft-deletes must start from
//! [`active_select`], [`active_update`] or [`active_soft_delete`] so the
//! `deleted_at IS NULL` filter lives in one place. [`unscoped_select`] is reserved for audit reads.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

pub(crate) const TABLE: &str = "relayed_msg";

pub(crate) const COLUMNS: &str = "id, msg_hash, height, layer1_hash, layer2_hash, \
     layer1_height, layer2_height, created_at, updated_at, deleted_at";

const ACTIVE: &str = "deleted_at IS NULL";

/// `SELECT <columns> FROM relayed_msg WHERE deleted_at IS NULL`; callers append `AND ...`.
pub(crate) fn active_select<'args>(columns: &str) -> QueryBuilder<'args, Sqlite> {
    QueryBuilder::new(format!("SELECT {columns} FROM {TABLE} WHERE {ACTIVE}"))
}

/// Marks matching active rows deleted at `at`; callers append `AND ...`.
pub(crate) fn active_soft_delete<'args>(at: DateTime<Utc>) -> QueryBuilder<'args, Sqlite> {
    let mut builder = QueryBuilder::new(format!("UPDATE {TABLE} SET deleted_at = "));
    builder.push_bind(at);
    builder.push(format!(" WHERE {ACTIVE}"));
    builder
}

/// `UPDATE relayed_msg SET <assignments>, updated_at = <at> WHERE deleted_at IS NULL`;
/// callers append `AND ...`.
pub(crate) fn active_update<'args>(
    assignments: &str,
    at: DateTime<Utc>,
) -> QueryBuilder<'args, Sqlite> {
    let mut builder = QueryBuilder::new(format!("UPDATE {TABLE} SET {assignments}, updated_at = "));
    builder.push_bind(at);
    builder.push(format!(" WHERE {ACTIVE}"));
    builder
}

/// Includes soft-deleted rows.
pub(crate) fn unscoped_select<'args>(columns: &str) -> QueryBuilder<'args, Sqlite> {
    QueryBuilder::new(format!("SELECT {columns} FROM {TABLE} WHERE 1=1"))
}

/// Conflict clause merging a write into the active row for the same hash.
///
/// Non-empty incoming layer hashes win together with their layer height;
/// empty ones keep what is stored.
pub(crate) fn upsert_clause() -> String {
    format!(
        " ON CONFLICT(msg_hash) WHERE {ACTIVE} DO UPDATE SET \
         height = excluded.height, \
         layer1_height = CASE WHEN excluded.layer1_hash != '' THEN excluded.layer1_height ELSE {TABLE}.layer1_height END, \
         layer2_height = CASE WHEN excluded.layer2_hash != '' THEN excluded.layer2_height ELSE {TABLE}.layer2_height END, \
         layer1_hash = CASE WHEN excluded.layer1_hash != '' THEN excluded.layer1_hash ELSE {TABLE}.layer1_hash END, \
         layer2_hash = CASE WHEN excluded.layer2_hash != '' THEN excluded.layer2_hash ELSE {TABLE}.layer2_hash END, \
         updated_at = excluded.updated_at"
    )
}

/// Schema for the table and its indexes. One active row per `msg_hash`.
pub(crate) const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS relayed_msg (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        msg_hash TEXT NOT NULL,
        height INTEGER NOT NULL,
        layer1_hash TEXT NOT NULL DEFAULT '',
        layer2_hash TEXT NOT NULL DEFAULT '',
        layer1_height INTEGER NOT NULL DEFAULT 0,
        layer2_height INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT DEFAULT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS relayed_msg_hash_uindex ON relayed_msg(msg_hash) WHERE deleted_at IS NULL;
    CREATE INDEX IF NOT EXISTS idx_relayed_msg_height ON relayed_msg(height);
    CREATE INDEX IF NOT EXISTS idx_relayed_msg_layer1_height ON relayed_msg(layer1_height);
    CREATE INDEX IF NOT EXISTS idx_relayed_msg_layer2_height ON relayed_msg(layer2_height);
    CREATE INDEX IF NOT EXISTS idx_relayed_msg_layer1_hash ON relayed_msg(layer1_hash);
    CREATE INDEX IF NOT EXISTS idx_relayed_msg_layer2_hash ON relayed_msg(layer2_hash);
    CREATE INDEX IF NOT EXISTS idx_relayed_msg_deleted_at ON relayed_msg(deleted_at);
"#;
