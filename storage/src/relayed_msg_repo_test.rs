//! Unit tests for RelayedMsgRepository.
//!
//! Covers chunked batch writes and lookups, upsert merging, audit history,
//! query deadlines and height range checks.

use std::time::Duration;

use tempfile::TempDir;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::models::{DeletionState, Layer, NewRelayedMsg};
use crate::relayed_msg_repo::RelayedMsgRepository;

fn test_config(dir: &TempDir) -> StorageConfig {
    StorageConfig::new(dir.path().join("relay.db").to_string_lossy().into_owned())
}

async fn open_repo(config: &StorageConfig) -> RelayedMsgRepository {
    RelayedMsgRepository::new(config)
        .await
        .expect("Failed to create repository")
}

fn layer1_batch(count: u64) -> Vec<NewRelayedMsg> {
    (0..count)
        .map(|i| NewRelayedMsg::on_layer1(format!("0xmsg{i}"), 100 + i, format!("0xtx{i}")))
        .collect()
}

#[tokio::test]
async fn test_batch_larger_than_chunk_size() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(&test_config(&dir).with_insert_chunk_size(2)).await;

    let batch = layer1_batch(5);
    repo.insert_batch(&batch, None)
        .await
        .expect("Failed to insert");

    let hashes: Vec<&str> = batch.iter().map(|r| r.msg_hash.as_str()).collect();
    let found = repo.get_by_hashes(&hashes, None).await.unwrap();
    assert_eq!(found.len(), 5);
    assert_eq!(repo.get_latest_height(Layer::L1, None).await.unwrap(), 104);
}

#[tokio::test]
async fn test_failure_in_last_chunk_rolls_back_earlier_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(&test_config(&dir).with_insert_chunk_size(2)).await;

    let mut batch = layer1_batch(4);
    batch.push(NewRelayedMsg::on_layer2("0xmsg0", 999, "0xdup"));

    let err = repo
        .insert_batch(&batch, None)
        .await
        .expect_err("Duplicate in last chunk should fail");
    assert!(matches!(err, StorageError::AlreadyExists { .. }));
    assert!(err.to_string().contains("5 records"));

    let hashes: Vec<&str> = batch.iter().map(|r| r.msg_hash.as_str()).collect();
    assert!(repo.get_by_hashes(&hashes, None).await.unwrap().is_empty());
    assert_eq!(repo.get_latest_height(Layer::L1, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_zero_chunk_size_is_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(&test_config(&dir).with_insert_chunk_size(0)).await;

    repo.insert_batch(&layer1_batch(3), None)
        .await
        .expect("Failed to insert");
    assert_eq!(repo.get_latest_height(Layer::L1, None).await.unwrap(), 102);
}

#[tokio::test]
async fn test_upsert_merges_opposite_layer() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(&test_config(&dir)).await;

    repo.insert_batch(&[NewRelayedMsg::on_layer2("0xmsg", 20, "0xl2tx")], None)
        .await
        .expect("Failed to insert");
    let before = repo.get_by_hash("0xmsg", None).await.unwrap().unwrap();

    repo.upsert_batch(
        &[
            NewRelayedMsg::on_layer1("0xmsg", 30, "0xl1tx"),
            NewRelayedMsg::on_layer1("0xfresh", 31, "0xl1fresh"),
        ],
        None,
    )
    .await
    .expect("Failed to upsert");

    let merged = repo.get_by_hash("0xmsg", None).await.unwrap().unwrap();
    assert_eq!(merged.id, before.id);
    assert_eq!(merged.height, 30);
    assert_eq!(merged.layer1_hash, "0xl1tx");
    assert_eq!(merged.layer2_hash, "0xl2tx");
    assert_eq!((merged.layer1_height, merged.layer2_height), (30, 20));
    assert_eq!(merged.created_at, before.created_at);
    assert!(merged.updated_at >= before.updated_at);

    assert!(repo.get_by_hash("0xfresh", None).await.unwrap().is_some());
    assert_eq!(repo.get_history_by_hash("0xmsg", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_history_includes_soft_deleted_rows() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(&test_config(&dir)).await;

    repo.insert_batch(&[NewRelayedMsg::on_layer1("0xmsg", 10, "0xold")], None)
        .await
        .unwrap();
    repo.delete_after(Layer::L1, 5, None).await.unwrap();

    // The hash is free again once its active row is soft-deleted.
    repo.insert_batch(&[NewRelayedMsg::on_layer1("0xmsg", 6, "0xnew")], None)
        .await
        .expect("Re-insert after rollback should succeed");

    let history = repo.get_history_by_hash("0xmsg", None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(matches!(history[0].deletion, DeletionState::Deleted(_)));
    assert_eq!(history[0].layer1_hash, "0xold");
    assert_eq!(history[1].deletion, DeletionState::Active);

    let current = repo.get_by_hash("0xmsg", None).await.unwrap().unwrap();
    assert_eq!(current.id, history[1].id);
    assert_eq!(current.layer1_hash, "0xnew");
}

#[tokio::test]
async fn test_height_out_of_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(&test_config(&dir)).await;

    let err = repo
        .insert_batch(&[NewRelayedMsg::on_layer1("0xbig", u64::MAX, "0xtx")], None)
        .await
        .expect_err("Height above i64::MAX cannot be stored");
    assert!(matches!(err, StorageError::HeightOutOfRange(u64::MAX)));

    // A mixed batch is rejected as a whole before anything is written.
    let err = repo
        .upsert_batch(
            &[
                NewRelayedMsg::on_layer1("0xok", 5, "0xtx"),
                NewRelayedMsg::on_layer2("0xbig", u64::MAX, "0xtx2"),
            ],
            None,
        )
        .await
        .expect_err("One out-of-range height rejects the batch");
    assert!(matches!(err, StorageError::HeightOutOfRange(u64::MAX)));
    assert!(repo.get_by_hash("0xok", None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rollback_above_max_storable_height_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(&test_config(&dir)).await;

    repo.insert_batch(&layer1_batch(2), None).await.unwrap();
    repo.insert_batch(&[NewRelayedMsg::on_layer2("0xl2", 50, "0xb")], None)
        .await
        .unwrap();

    assert_eq!(repo.delete_after(Layer::L1, u64::MAX, None).await.unwrap(), 0);
    assert_eq!(repo.delete_after(Layer::L2, u64::MAX, None).await.unwrap(), 0);
    assert_eq!(
        repo.delete_after(Layer::L1, i64::MAX as u64, None).await.unwrap(),
        0
    );

    assert_eq!(repo.get_latest_height(Layer::L1, None).await.unwrap(), 101);
    assert_eq!(repo.get_latest_height(Layer::L2, None).await.unwrap(), 50);
}

#[tokio::test]
async fn test_get_by_hashes_spans_lookup_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(&test_config(&dir)).await;

    let batch = layer1_batch(1_200);
    repo.insert_batch(&batch, None)
        .await
        .expect("Failed to insert");

    let mut hashes: Vec<String> = batch.iter().map(|r| r.msg_hash.clone()).collect();
    hashes.extend((0..50).map(|i| format!("0xmissing{i}")));
    // Repeats collapse before chunking.
    hashes.push("0xmsg0".to_string());
    hashes.push("0xmsg1199".to_string());

    let found = repo.get_by_hashes(&hashes, None).await.unwrap();
    assert_eq!(found.len(), 1_200);

    let mut found_hashes: Vec<&str> = found.iter().map(|r| r.msg_hash.as_str()).collect();
    found_hashes.sort_unstable();
    found_hashes.dedup();
    assert_eq!(found_hashes.len(), 1_200);
    assert!(found_hashes.contains(&"0xmsg0"));
    assert!(found_hashes.contains(&"0xmsg1199"));
}

#[tokio::test]
async fn test_query_timeout_while_database_locked() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir).with_query_timeout(Duration::from_millis(200));
    let repo = open_repo(&config).await;

    let mut tx = repo.begin().await.unwrap();
    repo.insert_batch(&[NewRelayedMsg::on_layer1("0xholder", 1, "0xa")], Some(&mut *tx))
        .await
        .expect("Failed to insert in transaction");

    let err = repo
        .insert_batch(&[NewRelayedMsg::on_layer1("0xwaiter", 2, "0xb")], None)
        .await
        .expect_err("Writer should time out while the lock is held");
    match err {
        StorageError::Timeout {
            operation, after, ..
        } => {
            assert_eq!(operation, "relayed_msg.insert_batch");
            assert_eq!(after, Duration::from_millis(200));
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    tx.rollback().await.unwrap();
}
