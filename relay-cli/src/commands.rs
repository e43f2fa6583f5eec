//! Command handlers. Each returns the JSON document `relayctl` prints.

use std::path::Path;

use anyhow::{Context, Result};
use relay_storage::{Layer, NewRelayedMsg, RelayedMsgRepository};
use serde_json::{json, Value};
use tracing::info;

use crate::cli::Commands;

pub async fn run(repo: &RelayedMsgRepository, command: Commands) -> Result<Value> {
    match command {
        Commands::Import { file, upsert } => import(repo, &file, upsert).await,
        Commands::Get { hashes } => get(repo, &hashes).await,
        Commands::History { hash } => history(repo, &hash).await,
        Commands::Latest => latest(repo).await,
        Commands::Rollback { layer, height } => rollback(repo, layer.into(), height).await,
    }
}

/// Reads a JSON array of relayed messages and writes it as one batch.
pub async fn import(repo: &RelayedMsgRepository, file: &Path, upsert: bool) -> Result<Value> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Read relayed messages from {}", file.display()))?;
    let records: Vec<NewRelayedMsg> =
        serde_json::from_str(&raw).context("Parse relayed messages JSON")?;

    let written = if upsert {
        repo.upsert_batch(&records, None).await
    } else {
        repo.insert_batch(&records, None).await
    };
    written.context("Write relayed messages batch")?;

    info!("Imported {} relayed messages from {}", records.len(), file.display());
    Ok(json!({ "imported": records.len(), "upsert": upsert }))
}

/// One hash prints the record (or `null`); several print the found records.
pub async fn get(repo: &RelayedMsgRepository, hashes: &[String]) -> Result<Value> {
    match hashes {
        [hash] => {
            let record = repo.get_by_hash(hash, None).await?;
            Ok(serde_json::to_value(record)?)
        }
        _ => {
            let records = repo.get_by_hashes(hashes, None).await?;
            Ok(serde_json::to_value(records)?)
        }
    }
}

pub async fn history(repo: &RelayedMsgRepository, hash: &str) -> Result<Value> {
    let records = repo.get_history_by_hash(hash, None).await?;
    Ok(serde_json::to_value(records)?)
}

pub async fn latest(repo: &RelayedMsgRepository) -> Result<Value> {
    let layer1 = repo.get_latest_height_on_layer1(None).await?;
    let layer2 = repo.get_latest_height_on_layer2(None).await?;
    Ok(json!({ "layer1": layer1, "layer2": layer2 }))
}

/// Soft-deletes the layer's records above `height` inside one transaction.
pub async fn rollback(repo: &RelayedMsgRepository, layer: Layer, height: u64) -> Result<Value> {
    let mut tx = repo.begin().await?;
    let deleted = repo.delete_after(layer, height, Some(&mut *tx)).await?;
    let latest = repo.get_latest_height(layer, Some(&mut *tx)).await?;
    tx.commit().await.context("Commit rollback")?;

    info!(
        "Rolled back {} on {} above height {}; latest is now {}",
        deleted, layer, height, latest
    );
    Ok(json!({ "layer": layer, "height": height, "deleted": deleted, "latest": latest }))
}
