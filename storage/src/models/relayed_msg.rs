//! Relayed message record model for persistence.
//!
//! Maps to the `relayed_msg` table and is used by RelayedMsgRepository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use super::Layer;
use crate::error::StorageError;

/// Heights are stored in SQLite's signed 64-bit integer column.
pub(crate) fn encode_height(height: u64) -> Result<i64, StorageError> {
    i64::try_from(height).map_err(|_| StorageError::HeightOutOfRange(height))
}

pub(crate) fn decode_height(height: i64) -> Result<u64, sqlx::Error> {
    u64::try_from(height).map_err(|e| sqlx::Error::ColumnDecode {
        index: "height".to_string(),
        source: Box::new(e),
    })
}

/// Soft-delete state of a row. Scoped reads only ever see `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "at", rename_all = "lowercase")]
pub enum DeletionState {
    Active,
    Deleted(DateTime<Utc>),
}

impl DeletionState {
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }
}

impl From<Option<DateTime<Utc>>> for DeletionState {
    fn from(deleted_at: Option<DateTime<Utc>>) -> Self {
        deleted_at.map_or(Self::Active, Self::Deleted)
    }
}

/// A stored relay record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedMsg {
    pub id: i64,
    pub msg_hash: String,
    /// Height of the most recently recorded relay.
    pub height: u64,
    /// Empty until the relay is observed on layer 1.
    pub layer1_hash: String,
    /// Empty until the relay is observed on layer 2.
    pub layer2_hash: String,
    /// Height of the layer-1 relay, 0 while `layer1_hash` is empty.
    pub layer1_height: u64,
    /// Height of the layer-2 relay, 0 while `layer2_hash` is empty.
    pub layer2_height: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deletion: DeletionState,
}

impl RelayedMsg {
    pub fn relay_hash(&self, layer: Layer) -> &str {
        match layer {
            Layer::L1 => &self.layer1_hash,
            Layer::L2 => &self.layer2_hash,
        }
    }

    pub fn relay_height(&self, layer: Layer) -> u64 {
        match layer {
            Layer::L1 => self.layer1_height,
            Layer::L2 => self.layer2_height,
        }
    }

    pub fn is_relayed_on(&self, layer: Layer) -> bool {
        !self.relay_hash(layer).is_empty()
    }
}

impl<'r> FromRow<'r, SqliteRow> for RelayedMsg {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let height = decode_height(row.try_get("height")?)?;
        let deleted_at: Option<DateTime<Utc>> = row.try_get("deleted_at")?;

        Ok(Self {
            id: row.try_get("id")?,
            msg_hash: row.try_get("msg_hash")?,
            height,
            layer1_hash: row.try_get("layer1_hash")?,
            layer2_hash: row.try_get("layer2_hash")?,
            layer1_height: decode_height(row.try_get("layer1_height")?)?,
            layer2_height: decode_height(row.try_get("layer2_height")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deletion: deleted_at.into(),
        })
    }
}

/// Caller-owned fields of a relay record; id and timestamps are assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRelayedMsg {
    pub msg_hash: String,
    pub height: u64,
    #[serde(default)]
    pub layer1_hash: String,
    #[serde(default)]
    pub layer2_hash: String,
}

impl NewRelayedMsg {
    /// A relay observed on layer 1 at `height` in transaction `layer1_hash`.
    pub fn on_layer1(
        msg_hash: impl Into<String>,
        height: u64,
        layer1_hash: impl Into<String>,
    ) -> Self {
        Self::on_layer(Layer::L1, msg_hash, height, layer1_hash)
    }

    /// A relay observed on layer 2 at `height` in transaction `layer2_hash`.
    pub fn on_layer2(
        msg_hash: impl Into<String>,
        height: u64,
        layer2_hash: impl Into<String>,
    ) -> Self {
        Self::on_layer(Layer::L2, msg_hash, height, layer2_hash)
    }

    pub fn on_layer(
        layer: Layer,
        msg_hash: impl Into<String>,
        height: u64,
        relay_hash: impl Into<String>,
    ) -> Self {
        let mut msg = Self {
            msg_hash: msg_hash.into(),
            height,
            layer1_hash: String::new(),
            layer2_hash: String::new(),
        };
        match layer {
            Layer::L1 => msg.layer1_hash = relay_hash.into(),
            Layer::L2 => msg.layer2_hash = relay_hash.into(),
        }
        msg
    }
}
