//! Relayed message repository: reorg-safe bookkeeping of cross-layer relays.
//!
//! Uses SqlitePoolManager and the models (RelayedMsg, NewRelayedMsg, Layer).
//! Every operation takes an optional connection; pass a transaction
//! (`Some(&mut *tx)`) to group it with writes to sibling tables, or `None` to
//! run on the pool. Dropping a returned future cancels the store call.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{Connection, QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, error, info};

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::models::{decode_height, encode_height, Layer, NewRelayedMsg, RelayedMsg};
use crate::scope::{self, COLUMNS, TABLE};
use crate::sqlite_pool::SqlitePoolManager;

/// Hashes per `IN (...)` lookup statement.
const LOOKUP_CHUNK_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Insert,
    Upsert,
}

impl WriteMode {
    fn operation(self) -> &'static str {
        match self {
            Self::Insert => "relayed_msg.insert_batch",
            Self::Upsert => "relayed_msg.upsert_batch",
        }
    }
}

#[derive(Clone)]
pub struct RelayedMsgRepository {
    pool_manager: SqlitePoolManager,
    query_timeout: Option<Duration>,
    insert_chunk_size: usize,
}

impl RelayedMsgRepository {
    /// Opens the pool and creates the `relayed_msg` table if missing.
    pub async fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let pool_manager = SqlitePoolManager::new(config).await.map_err(|e| {
            StorageError::from_sqlx("relayed_msg.open", config.database_url.clone(), e)
        })?;
        let repo = Self {
            pool_manager,
            query_timeout: config.query_timeout,
            insert_chunk_size: config.effective_chunk_size(),
        };
        repo.init().await?;
        Ok(repo)
    }

    async fn init(&self) -> Result<(), StorageError> {
        info!("Creating {} table if not exist", TABLE);

        sqlx::query(scope::SCHEMA)
            .execute(self.pool_manager.pool())
            .await
            .map_err(|e| StorageError::from_sqlx("relayed_msg.init", TABLE.to_string(), e))?;

        info!("{} table ready", TABLE);
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        self.pool_manager.pool()
    }

    /// Starts a transaction to pass to several operations.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StorageError> {
        self.pool()
            .begin()
            .await
            .map_err(|e| StorageError::from_sqlx("relayed_msg.begin", String::new(), e))
    }

    /// Returns the active record for `msg_hash`, or `None`.
    pub async fn get_by_hash(
        &self,
        msg_hash: &str,
        conn: Option<&mut SqliteConnection>,
    ) -> Result<Option<RelayedMsg>, StorageError> {
        let pool = self.pool();
        let mut builder = scope::active_select(COLUMNS);
        builder
            .push(" AND msg_hash = ")
            .push_bind(msg_hash.to_owned())
            .push(" ORDER BY id DESC LIMIT 1");
        let query = builder.build_query_as::<RelayedMsg>();

        let record = self
            .guarded(
                "relayed_msg.get_by_hash",
                || format!("msg_hash={msg_hash}"),
                async move {
                    match conn {
                        Some(conn) => query.fetch_optional(conn).await,
                        None => query.fetch_optional(pool).await,
                    }
                },
            )
            .await?;

        debug!("Relayed message {} found: {}", msg_hash, record.is_some());
        Ok(record)
    }

    /// Returns the active records among `msg_hashes`; missing hashes are skipped.
    pub async fn get_by_hashes<S>(
        &self,
        msg_hashes: &[S],
        mut conn: Option<&mut SqliteConnection>,
    ) -> Result<Vec<RelayedMsg>, StorageError>
    where
        S: AsRef<str> + Sync,
    {
        let unique: Vec<&str> = msg_hashes
            .iter()
            .map(AsRef::<str>::as_ref)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let pool = self.pool();
        let records = self
            .guarded(
                "relayed_msg.get_by_hashes",
                || format!("{} msg_hashes", unique.len()),
                async {
                    let mut records = Vec::with_capacity(unique.len());
                    for chunk in unique.chunks(LOOKUP_CHUNK_SIZE) {
                        let mut builder = scope::active_select(COLUMNS);
                        builder.push(" AND msg_hash IN (");
                        let mut separated = builder.separated(", ");
                        for hash in chunk {
                            separated.push_bind(hash.to_string());
                        }
                        separated.push_unseparated(")");

                        let query = builder.build_query_as::<RelayedMsg>();
                        let found = match conn.as_deref_mut() {
                            Some(conn) => query.fetch_all(conn).await?,
                            None => query.fetch_all(pool).await?,
                        };
                        records.extend(found);
                    }
                    Ok::<_, sqlx::Error>(records)
                },
            )
            .await?;

        debug!(
            "Retrieved {} relayed messages for {} hashes",
            records.len(),
            unique.len()
        );
        Ok(records)
    }

    /// Highest height with a relay on `layer`; `0` when nothing was relayed there.
    pub async fn get_latest_height(
        &self,
        layer: Layer,
        conn: Option<&mut SqliteConnection>,
    ) -> Result<u64, StorageError> {
        let operation = match layer {
            Layer::L1 => "relayed_msg.get_latest_height_on_layer1",
            Layer::L2 => "relayed_msg.get_latest_height_on_layer2",
        };
        let pool = self.pool();
        let height_column = layer.relay_height_column();
        let mut builder = scope::active_select(height_column);
        builder.push(format!(
            " AND {} != '' ORDER BY {height_column} DESC LIMIT 1",
            layer.relay_hash_column()
        ));
        let query = builder.build_query_as::<(i64,)>();

        let height = self
            .guarded(operation, || format!("layer={layer}"), async move {
                let row = match conn {
                    Some(conn) => query.fetch_optional(conn).await?,
                    None => query.fetch_optional(pool).await?,
                };
                row.map(|(height,)| decode_height(height)).transpose()
            })
            .await?
            .unwrap_or(0);

        debug!("Latest relayed height on {}: {}", layer, height);
        Ok(height)
    }

    pub async fn get_latest_height_on_layer1(
        &self,
        conn: Option<&mut SqliteConnection>,
    ) -> Result<u64, StorageError> {
        self.get_latest_height(Layer::L1, conn).await
    }

    pub async fn get_latest_height_on_layer2(
        &self,
        conn: Option<&mut SqliteConnection>,
    ) -> Result<u64, StorageError> {
        self.get_latest_height(Layer::L2, conn).await
    }

    /// Inserts all records or none. Fails with [`StorageError::AlreadyExists`]
    /// if any hash already has an active row.
    pub async fn insert_batch(
        &self,
        records: &[NewRelayedMsg],
        conn: Option<&mut SqliteConnection>,
    ) -> Result<(), StorageError> {
        self.write_batch(WriteMode::Insert, records, conn).await
    }

    /// Like [`insert_batch`](Self::insert_batch), but a hash that already has
    /// an active row is merged into it: non-empty layer hashes are taken from
    /// the incoming record, `height` is replaced.
    pub async fn upsert_batch(
        &self,
        records: &[NewRelayedMsg],
        conn: Option<&mut SqliteConnection>,
    ) -> Result<(), StorageError> {
        self.write_batch(WriteMode::Upsert, records, conn).await
    }

    async fn write_batch(
        &self,
        mode: WriteMode,
        records: &[NewRelayedMsg],
        conn: Option<&mut SqliteConnection>,
    ) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }

        let operation = mode.operation();
        let rows = match records
            .iter()
            .map(|record| encode_height(record.height).map(|height| (record, height)))
            .collect::<Result<Vec<_>, StorageError>>()
        {
            Ok(rows) => rows,
            Err(err) => {
                log_batch_failure(operation, records, &err);
                return Err(err);
            }
        };
        let now = Utc::now();
        let chunk_size = self.insert_chunk_size;
        let pool = self.pool();

        let result = self
            .guarded(operation, || batch_summary(records), async move {
                match conn {
                    Some(conn) => {
                        let mut tx = conn.begin().await?;
                        write_chunks(&mut tx, mode, &rows, now, chunk_size).await?;
                        tx.commit().await
                    }
                    None => {
                        let mut tx = pool.begin().await?;
                        write_chunks(&mut tx, mode, &rows, now, chunk_size).await?;
                        tx.commit().await
                    }
                }
            })
            .await;

        if let Err(err) = &result {
            log_batch_failure(operation, records, err);
        } else {
            info!("Wrote {} relayed messages ({:?})", records.len(), mode);
        }
        result
    }

    /// Rolls back `layer` above `height`: active records relayed there only
    /// are soft-deleted; records also relayed on the other layer lose this
    /// layer's hash and height and keep the other relay. Returns the number
    /// of records rolled back either way.
    pub async fn delete_after(
        &self,
        layer: Layer,
        height: u64,
        conn: Option<&mut SqliteConnection>,
    ) -> Result<u64, StorageError> {
        let operation = match layer {
            Layer::L1 => "relayed_msg.delete_layer1_after",
            Layer::L2 => "relayed_msg.delete_layer2_after",
        };
        // No stored height exceeds i64::MAX, so nothing lies above such a threshold.
        let Ok(threshold) = encode_height(height) else {
            debug!("Nothing relayed on {} above height {}", layer, height);
            return Ok(0);
        };
        let now = Utc::now();
        let pool = self.pool();

        let (deleted, detached) = self
            .guarded(
                operation,
                || format!("layer={layer}, height={height}"),
                async move {
                    match conn {
                        Some(conn) => {
                            let mut tx = conn.begin().await?;
                            let counts = roll_back_layer(&mut tx, layer, threshold, now).await?;
                            tx.commit().await?;
                            Ok::<_, sqlx::Error>(counts)
                        }
                        None => {
                            let mut tx = pool.begin().await?;
                            let counts = roll_back_layer(&mut tx, layer, threshold, now).await?;
                            tx.commit().await?;
                            Ok::<_, sqlx::Error>(counts)
                        }
                    }
                },
            )
            .await?;

        info!(
            "Rolled back {} above height {}: {} soft-deleted, {} kept for {}",
            layer,
            height,
            deleted,
            detached,
            layer.other()
        );
        Ok(deleted + detached)
    }

    pub async fn delete_layer1_after(
        &self,
        height: u64,
        conn: Option<&mut SqliteConnection>,
    ) -> Result<u64, StorageError> {
        self.delete_after(Layer::L1, height, conn).await
    }

    pub async fn delete_layer2_after(
        &self,
        height: u64,
        conn: Option<&mut SqliteConnection>,
    ) -> Result<u64, StorageError> {
        self.delete_after(Layer::L2, height, conn).await
    }

    /// Every row ever stored for `msg_hash`, soft-deleted ones included, oldest first.
    pub async fn get_history_by_hash(
        &self,
        msg_hash: &str,
        conn: Option<&mut SqliteConnection>,
    ) -> Result<Vec<RelayedMsg>, StorageError> {
        let pool = self.pool();
        let mut builder = scope::unscoped_select(COLUMNS);
        builder
            .push(" AND msg_hash = ")
            .push_bind(msg_hash.to_owned())
            .push(" ORDER BY id ASC");
        let query = builder.build_query_as::<RelayedMsg>();

        let records = self
            .guarded(
                "relayed_msg.get_history_by_hash",
                || format!("msg_hash={msg_hash}"),
                async move {
                    match conn {
                        Some(conn) => query.fetch_all(conn).await,
                        None => query.fetch_all(pool).await,
                    }
                },
            )
            .await?;

        debug!("Retrieved {} history rows for {}", records.len(), msg_hash);
        Ok(records)
    }

    /// Runs `fut` under the configured deadline and attaches `operation` and
    /// `context` to any failure.
    async fn guarded<T, F, C>(
        &self,
        operation: &'static str,
        context: C,
        fut: F,
    ) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
        C: FnOnce() -> String,
    {
        let outcome = match self.query_timeout {
            Some(after) => match tokio::time::timeout(after, fut).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(StorageError::Timeout {
                        operation,
                        context: context(),
                        after,
                    })
                }
            },
            None => fut.await,
        };
        outcome.map_err(|source| StorageError::from_sqlx(operation, context(), source))
    }
}

async fn write_chunks(
    conn: &mut SqliteConnection,
    mode: WriteMode,
    rows: &[(&NewRelayedMsg, i64)],
    now: DateTime<Utc>,
    chunk_size: usize,
) -> Result<(), sqlx::Error> {
    for chunk in rows.chunks(chunk_size) {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {TABLE} (msg_hash, height, layer1_hash, layer2_hash, \
             layer1_height, layer2_height, created_at, updated_at) "
        ));
        builder.push_values(chunk, |mut row, (record, height)| {
            let layer1_height = if record.layer1_hash.is_empty() { 0 } else { *height };
            let layer2_height = if record.layer2_hash.is_empty() { 0 } else { *height };
            row.push_bind(record.msg_hash.clone())
                .push_bind(*height)
                .push_bind(record.layer1_hash.clone())
                .push_bind(record.layer2_hash.clone())
                .push_bind(layer1_height)
                .push_bind(layer2_height)
                .push_bind(now)
                .push_bind(now);
        });
        if mode == WriteMode::Upsert {
            builder.push(scope::upsert_clause());
        }
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

/// Soft-deletes rows relayed only on `layer` above `threshold` and detaches
/// `layer` from rows that also carry the other layer's relay. Returns
/// `(deleted, detached)`.
async fn roll_back_layer(
    conn: &mut SqliteConnection,
    layer: Layer,
    threshold: i64,
    now: DateTime<Utc>,
) -> Result<(u64, u64), sqlx::Error> {
    let hash_column = layer.relay_hash_column();
    let height_column = layer.relay_height_column();
    let other_hash_column = layer.other().relay_hash_column();
    let other_height_column = layer.other().relay_height_column();

    let mut detach = scope::active_update(
        &format!("{hash_column} = '', {height_column} = 0, height = {other_height_column}"),
        now,
    );
    detach
        .push(format!(
            " AND {hash_column} != '' AND {other_hash_column} != '' AND {height_column} > "
        ))
        .push_bind(threshold);
    let detached = detach.build().execute(&mut *conn).await?.rows_affected();

    let mut delete = scope::active_soft_delete(now);
    delete
        .push(format!(
            " AND {hash_column} != '' AND {other_hash_column} = '' AND {height_column} > "
        ))
        .push_bind(threshold);
    let deleted = delete.build().execute(&mut *conn).await?.rows_affected();

    Ok((deleted, detached))
}

fn log_batch_failure(operation: &'static str, records: &[NewRelayedMsg], err: &StorageError) {
    let msg_hashes: Vec<&str> = records.iter().map(|r| r.msg_hash.as_str()).collect();
    let layer1_hashes: Vec<&str> = records.iter().map(|r| r.layer1_hash.as_str()).collect();
    let layer2_hashes: Vec<&str> = records.iter().map(|r| r.layer2_hash.as_str()).collect();
    let heights: Vec<u64> = records.iter().map(|r| r.height).collect();
    error!(
        operation,
        ?msg_hashes,
        ?layer1_hashes,
        ?layer2_hashes,
        ?heights,
        error = %err,
        "failed to write relayed messages"
    );
}

fn batch_summary(records: &[NewRelayedMsg]) -> String {
    let min = records.iter().map(|r| r.height).min().unwrap_or(0);
    let max = records.iter().map(|r| r.height).max().unwrap_or(0);
    let first = records.first().map_or("", |r| r.msg_hash.as_str());
    format!(
        "{} records, heights {}..={}, first msg_hash={}",
        records.len(),
        min,
        max,
        first
    )
}
