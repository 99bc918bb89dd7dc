//! MySQL backup/restore cycle against a container

use super::common::{
    backup_mutate_restore, exec, is_docker_available, start_container, wait_until_ready,
    ContainerGuard,
};
use anyhow::Result;
use db_backup::managers::prompt::FixedAnswer;
use db_backup::{BackupManager, RestoreOutcome};
use std::sync::Arc;
use test_utils::{DatabaseType, TargetBuilder, TestContext};

fn mysql(container: &str, sql: &str) -> Result<String> {
    exec(
        container,
        &[
            "mysql", "-h127.0.0.1", "-uroot", "-ptestpass", "-N", "-B", "testdb", "-e", sql,
        ],
    )
}

fn count(container: &str, table: &str) -> Result<i64> {
    Ok(mysql(container, &format!("SELECT COUNT(*) FROM {}", table))?.parse()?)
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_mysql_backup_restore_cycle() {
    if !is_docker_available() {
        println!("Docker not available, skipping test");
        return;
    }

    let container = ContainerGuard::new("db-backup-test-mysql");
    let name = container.name();
    let port = start_container(
        name,
        "mysql:8.0",
        &["MYSQL_ROOT_PASSWORD=testpass", "MYSQL_DATABASE=testdb"],
        3306,
    )
    .expect("Failed to start MySQL");
    wait_until_ready("MySQL", 120, || mysql(name, "SELECT 1").is_ok())
        .expect("MySQL not ready");

    mysql(
        name,
        "CREATE TABLE customers (id INT PRIMARY KEY, name VARCHAR(64) NOT NULL);
         CREATE TABLE orders (
             id INT AUTO_INCREMENT PRIMARY KEY,
             customer_id INT NOT NULL,
             note TEXT,
             payload BLOB,
             FOREIGN KEY (customer_id) REFERENCES customers(id)
         );
         INSERT INTO customers VALUES (1, 'O''Brien'), (2, 'semi;colon');
         INSERT INTO orders (customer_id, note, payload) VALUES
             (1, 'first\\nline', UNHEX('00FF10')),
             (2, NULL, NULL),
             (2, 'back\\\\slash', UNHEX('DEADBEEF'));",
    )
    .expect("Failed to create test data");

    let ctx = TestContext::new();
    let target = TargetBuilder::new("shop", DatabaseType::Mysql)
        .name("testdb")
        .host("127.0.0.1", port)
        .credentials("root", "testpass")
        .backup_path(&ctx.create_subdir("backups"))
        .build();

    backup_mutate_restore(&target, || {
        mysql(
            name,
            "DELETE FROM orders WHERE id = 1; INSERT INTO customers VALUES (3, 'late');",
        )?;
        Ok(())
    })
    .await
    .expect("Backup/restore cycle failed");

    assert_eq!(count(name, "customers").unwrap(), 2);
    assert_eq!(count(name, "orders").unwrap(), 3);
    assert_eq!(
        mysql(name, "SELECT HEX(payload) FROM orders WHERE id = 1").unwrap(),
        "00FF10"
    );
    assert_eq!(
        mysql(name, "SELECT name FROM customers WHERE id = 1").unwrap(),
        "O'Brien"
    );
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_mysql_restore_twice_without_force_skips_existing() {
    if !is_docker_available() {
        println!("Docker not available, skipping test");
        return;
    }

    let container = ContainerGuard::new("db-backup-test-mysql-merge");
    let name = container.name();
    let port = start_container(
        name,
        "mysql:8.0",
        &["MYSQL_ROOT_PASSWORD=testpass", "MYSQL_DATABASE=testdb"],
        3306,
    )
    .expect("Failed to start MySQL");
    wait_until_ready("MySQL", 120, || mysql(name, "SELECT 1").is_ok())
        .expect("MySQL not ready");

    mysql(
        name,
        "CREATE TABLE tags (id INT PRIMARY KEY, label VARCHAR(32) NOT NULL);
         INSERT INTO tags VALUES (1, 'red'), (2, 'green'), (3, 'blue');",
    )
    .expect("Failed to create test data");

    let ctx = TestContext::new();
    let target = TargetBuilder::new("tags", DatabaseType::Mysql)
        .name("testdb")
        .host("127.0.0.1", port)
        .credentials("root", "testpass")
        .backup_path(&ctx.create_subdir("backups"))
        .build();

    let manager = BackupManager::new().with_prompt(Arc::new(FixedAnswer(true)));
    let artifact = manager.perform_backup(&target).await.expect("Backup failed");
    let artifact = artifact.to_string_lossy().to_string();

    mysql(name, "DELETE FROM tags WHERE id = 2; INSERT INTO tags VALUES (4, 'late');")
        .expect("Failed to mutate data");

    // The table exists and rows 1 and 3 are duplicates on both runs
    for _ in 0..2 {
        let outcome = manager
            .perform_restore(&target, &artifact, false)
            .await
            .expect("Restore without force failed");
        assert_eq!(outcome, RestoreOutcome::Restored);
    }

    assert_eq!(count(name, "tags").unwrap(), 4);
    assert_eq!(
        mysql(name, "SELECT label FROM tags WHERE id = 2").unwrap(),
        "green"
    );
}
