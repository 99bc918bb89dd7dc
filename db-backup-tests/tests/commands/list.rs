//! Tests for listing a target's backups

use db_backup::config::load_config;
use db_backup::BackupManager;
use test_utils::{ConfigBuilder, ResultAssertions, TestContext};

#[tokio::test]
async fn test_list_backups_per_target() {
    let ctx = TestContext::new();
    let app_db = ctx.seed_sqlite("app.db", 2);
    let logs_db = ctx.seed_sqlite("logs.db", 2);

    let (config, _dir) = ConfigBuilder::new()
        .add_sqlite_target("app", &app_db)
        .add_sqlite_target("logs", &logs_db)
        .persist();
    let manager = BackupManager::new();

    manager.backup_all(&config.targets).await.assert_ok();
    let app = config.find_target("app").assert_ok();

    let app_backups = manager.list_backups(app).assert_ok();
    let logs_backups = manager
        .list_backups(config.find_target("logs").assert_ok())
        .assert_ok();

    assert_eq!(app_backups.len(), 1);
    assert_eq!(logs_backups.len(), 1);
    for backup in &app_backups {
        let name = backup.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("sqlite_app_app_"), "{}", name);
        assert!(name.ends_with(".db.zip"));
    }
}

#[tokio::test]
async fn test_list_backups_empty_before_first_run() {
    let ctx = TestContext::new();
    let (config, _dir) = ConfigBuilder::new()
        .add_sqlite_target("app", &ctx.temp_dir().join("app.db"))
        .persist();

    let backups = BackupManager::new()
        .list_backups(&config.targets[0])
        .assert_ok();
    assert!(backups.is_empty());
}

#[tokio::test]
async fn test_saved_config_drives_backups() {
    let ctx = TestContext::new();
    let db = ctx.seed_sqlite("shop.db", 3);
    let config = ConfigBuilder::new().add_sqlite_target("shop", &db).build();
    let path = ctx.write_config(&config);

    let loaded = load_config(&path).assert_ok();
    let artifacts = BackupManager::new()
        .backup_all(&loaded.select_targets(Some("shop")).assert_ok())
        .await
        .assert_ok();

    assert_eq!(artifacts.len(), 1);
    assert_eq!(
        BackupManager::new().list_backups(&loaded.targets[0]).assert_ok(),
        artifacts
    );
}
