//! Tests for `perform_restore`

use db_backup::managers::prompt::FixedAnswer;
use db_backup::{BackupError, BackupManager, HandlerRegistry, RestoreOutcome};
use std::sync::Arc;
use std::time::Duration;
use test_utils::{
    count_rows, seed_sqlite, CloudType, MockStorage, OptionAssertions, ResultAssertions,
    StorageCall, TargetBuilder, TestContext,
};

fn confirming_manager() -> BackupManager {
    BackupManager::new().with_prompt(Arc::new(FixedAnswer(true)))
}

#[tokio::test]
async fn test_sqlite_round_trip_restores_snapshot() {
    let ctx = TestContext::new();
    let db = ctx.seed_sqlite("a.db", 5);
    let target = TargetBuilder::sqlite("t1", &db)
        .backup_path(&ctx.temp_dir().join("b"))
        .build();
    let manager = confirming_manager();

    let artifact = manager.perform_backup(&target).await.assert_ok();
    seed_sqlite(&db, 3).unwrap();
    assert_eq!(count_rows(&db, "items").unwrap(), 8);

    let outcome = manager
        .perform_restore(&target, &artifact.to_string_lossy(), false)
        .await
        .assert_ok();

    assert_eq!(outcome, RestoreOutcome::Restored);
    assert_eq!(count_rows(&db, "items").unwrap(), 5);
}

#[tokio::test]
async fn test_restore_recreates_deleted_database() {
    let ctx = TestContext::new();
    let db = ctx.seed_sqlite("data/a.db", 4);
    let target = TargetBuilder::sqlite("t1", &db)
        .backup_path(&ctx.temp_dir().join("b"))
        .build();
    let manager = confirming_manager();

    let artifact = manager.perform_backup(&target).await.assert_ok();
    std::fs::remove_dir_all(ctx.temp_dir().join("data")).unwrap();

    manager
        .perform_restore(&target, &artifact.to_string_lossy(), true)
        .await
        .assert_ok();
    assert_eq!(count_rows(&db, "items").unwrap(), 4);
}

#[tokio::test]
async fn test_restore_from_latest_backup() {
    let ctx = TestContext::new();
    let db = ctx.seed_sqlite("a.db", 2);
    let staging = ctx.temp_dir().join("b");
    let target = TargetBuilder::sqlite("t1", &db).backup_path(&staging).build();
    let manager = confirming_manager();

    manager.perform_backup(&target).await.assert_ok();
    // Artifact names have one-second resolution
    tokio::time::sleep(Duration::from_millis(1100)).await;
    seed_sqlite(&db, 4).unwrap();
    let newest = manager.perform_backup(&target).await.assert_ok();
    seed_sqlite(&db, 10).unwrap();

    let latest = manager
        .find_latest_backup(&target, &staging)
        .assert_ok()
        .assert_some();
    assert_eq!(latest, newest);

    manager
        .perform_restore(&target, &latest.to_string_lossy(), true)
        .await
        .assert_ok();
    assert_eq!(count_rows(&db, "items").unwrap(), 6);
}

#[tokio::test]
async fn test_declined_restore_leaves_database_alone() {
    let ctx = TestContext::new();
    let db = ctx.seed_sqlite("a.db", 5);
    let target = TargetBuilder::sqlite("t1", &db)
        .backup_path(&ctx.temp_dir().join("b"))
        .build();

    let artifact = confirming_manager().perform_backup(&target).await.assert_ok();
    seed_sqlite(&db, 1).unwrap();

    let outcome = BackupManager::new()
        .with_prompt(Arc::new(FixedAnswer(false)))
        .perform_restore(&target, &artifact.to_string_lossy(), false)
        .await
        .assert_ok();

    assert_eq!(outcome, RestoreOutcome::Cancelled);
    assert_eq!(count_rows(&db, "items").unwrap(), 6);
}

#[tokio::test]
async fn test_missing_backup_file_is_integrity_error() {
    let ctx = TestContext::new();
    let db = ctx.seed_sqlite("a.db", 1);
    let target = TargetBuilder::sqlite("t1", &db)
        .backup_path(&ctx.temp_dir().join("b"))
        .build();

    let missing = ctx.temp_dir().join("b").join("sqlite_t1_a_20240101_000000.db.zip");
    let err = confirming_manager()
        .perform_restore(&target, &missing.to_string_lossy(), true)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<BackupError>(),
        Some(BackupError::DataIntegrity(_))
    ));
    assert_eq!(count_rows(&db, "items").unwrap(), 1);
}

#[tokio::test]
async fn test_artifact_of_other_engine_is_rejected() {
    let ctx = TestContext::new();
    let db = ctx.seed_sqlite("a.db", 1);
    let target = TargetBuilder::sqlite("t1", &db)
        .backup_path(&ctx.temp_dir().join("b"))
        .build();

    let dump = ctx.create_file("b/sqlite_t1_a_20240101_000000.sql", "DROP TABLE items;\n");
    let zipped = db_backup::utils::compress_backup(&dump).unwrap();

    confirming_manager()
        .perform_restore(&target, &zipped.to_string_lossy(), true)
        .await
        .assert_err_contains("Invalid backup file extension");
    assert_eq!(count_rows(&db, "items").unwrap(), 1);
}

#[tokio::test]
async fn test_restore_fetches_from_storage_by_name() {
    let ctx = TestContext::new();
    let db = ctx.seed_sqlite("a.db", 3);
    let staging = ctx.temp_dir().join("b");
    let target = TargetBuilder::sqlite("t1", &db)
        .backup_path(&staging)
        .s3("bucket")
        .build();

    let storage = MockStorage::new();
    let manager = BackupManager::with_registry(
        HandlerRegistry::new().with_storage(CloudType::S3, Arc::new(storage.clone())),
    )
    .with_prompt(Arc::new(FixedAnswer(true)));

    let artifact = manager.perform_backup(&target).await.assert_ok();
    let name = artifact.file_name().unwrap().to_string_lossy().to_string();

    // Only the bucket copy remains
    std::fs::remove_file(&artifact).unwrap();
    seed_sqlite(&db, 2).unwrap();

    manager.perform_restore(&target, &name, true).await.assert_ok();

    assert_eq!(count_rows(&db, "items").unwrap(), 3);
    assert!(storage
        .get_calls()
        .iter()
        .any(|call| matches!(call, StorageCall::Retrieve { reference, .. } if *reference == name)));
}
