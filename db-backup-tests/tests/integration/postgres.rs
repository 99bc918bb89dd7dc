//! PostgreSQL backup/restore cycle against a container

use super::common::{
    backup_mutate_restore, exec, is_docker_available, start_container, wait_until_ready,
    ContainerGuard,
};
use anyhow::Result;
use test_utils::{DatabaseType, TargetBuilder, TestContext};

fn psql(container: &str, sql: &str) -> Result<String> {
    exec(
        container,
        &["psql", "-U", "postgres", "-d", "testdb", "-t", "-A", "-c", sql],
    )
}

/// The init phase only listens on the socket, so probe over TCP
fn is_accepting_tcp(container: &str) -> bool {
    exec(container, &["pg_isready", "-h", "127.0.0.1", "-U", "postgres"]).is_ok()
}

fn count(container: &str, relation: &str) -> Result<i64> {
    Ok(psql(container, &format!("SELECT COUNT(*) FROM {}", relation))?.parse()?)
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_postgres_backup_restore_cycle() {
    if !is_docker_available() {
        println!("Docker not available, skipping test");
        return;
    }

    let container = ContainerGuard::new("db-backup-test-postgres");
    let name = container.name();
    let port = start_container(
        name,
        "postgres:15-alpine",
        &["POSTGRES_PASSWORD=testpass", "POSTGRES_DB=testdb"],
        5432,
    )
    .expect("Failed to start PostgreSQL");
    wait_until_ready("PostgreSQL", 60, || is_accepting_tcp(name))
        .expect("PostgreSQL not ready");

    psql(
        name,
        "CREATE TABLE items (id SERIAL PRIMARY KEY, label TEXT NOT NULL UNIQUE, note TEXT);
         INSERT INTO items (label, note) VALUES ('a', 'it''s'), ('b', E'two\\nlines'), ('c', NULL);
         CREATE VIEW labelled AS SELECT label FROM items WHERE note IS NOT NULL;
         CREATE FUNCTION item_count() RETURNS bigint LANGUAGE plpgsql AS $$
         BEGIN
           RETURN (SELECT COUNT(*) FROM items);
         END;
         $$;",
    )
    .expect("Failed to create test data");

    let ctx = TestContext::new();
    let target = TargetBuilder::new("pg", DatabaseType::Postgresql)
        .name("testdb")
        .host("127.0.0.1", port)
        .credentials("postgres", "testpass")
        .backup_path(&ctx.create_subdir("backups"))
        .build();

    backup_mutate_restore(&target, || {
        psql(name, "INSERT INTO items (label) VALUES ('d'), ('e'); DROP VIEW labelled;")?;
        Ok(())
    })
    .await
    .expect("Backup/restore cycle failed");

    assert_eq!(count(name, "items").unwrap(), 3);
    assert_eq!(count(name, "labelled").unwrap(), 2);
    assert_eq!(psql(name, "SELECT item_count()").unwrap(), "3");
    assert_eq!(
        psql(name, "SELECT note FROM items WHERE label = 'a'").unwrap(),
        "it's"
    );
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_postgres_wrong_password_is_connectivity_error() {
    if !is_docker_available() {
        println!("Docker not available, skipping test");
        return;
    }

    let container = ContainerGuard::new("db-backup-test-postgres-auth");
    let name = container.name();
    let port = start_container(
        name,
        "postgres:15-alpine",
        &["POSTGRES_PASSWORD=testpass", "POSTGRES_DB=testdb"],
        5432,
    )
    .expect("Failed to start PostgreSQL");
    wait_until_ready("PostgreSQL", 60, || is_accepting_tcp(name))
        .expect("PostgreSQL not ready");

    let ctx = TestContext::new();
    let target = TargetBuilder::new("pg", DatabaseType::Postgresql)
        .name("testdb")
        .host("127.0.0.1", port)
        .credentials("postgres", "wrong")
        .backup_path(&ctx.create_subdir("backups"))
        .build();

    let err = db_backup::BackupManager::new()
        .perform_backup(&target)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<db_backup::BackupError>(),
        Some(db_backup::BackupError::Connectivity { .. })
    ));
    assert!(ctx.file_names(&ctx.temp_dir().join("backups")).is_empty());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_postgres_keys_and_triggers_survive_restore() {
    if !is_docker_available() {
        println!("Docker not available, skipping test");
        return;
    }

    let container = ContainerGuard::new("db-backup-test-postgres-keys");
    let name = container.name();
    let port = start_container(
        name,
        "postgres:15-alpine",
        &["POSTGRES_PASSWORD=testpass", "POSTGRES_DB=testdb"],
        5432,
    )
    .expect("Failed to start PostgreSQL");
    wait_until_ready("PostgreSQL", 60, || is_accepting_tcp(name))
        .expect("PostgreSQL not ready");

    // `orders` sorts before `users`, so its rows are dumped first
    psql(
        name,
        "CREATE TABLE users (id SERIAL PRIMARY KEY, name TEXT NOT NULL);
         CREATE TABLE orders (
             id SERIAL PRIMARY KEY,
             user_id INTEGER NOT NULL REFERENCES users(id),
             total NUMERIC(10, 2),
             updated_at TIMESTAMP
         );
         INSERT INTO users (name) VALUES ('ann'), ('bob');
         INSERT INTO orders (user_id, total) VALUES (1, 9.50), (2, 3.25), (2, 1.00);
         CREATE FUNCTION touch() RETURNS trigger LANGUAGE plpgsql AS $$
         BEGIN
           NEW.updated_at := now();
           RETURN NEW;
         END;
         $$;
         CREATE TRIGGER orders_touch BEFORE UPDATE ON orders
             FOR EACH ROW EXECUTE FUNCTION touch();",
    )
    .expect("Failed to create test data");

    let ctx = TestContext::new();
    let target = TargetBuilder::new("pg", DatabaseType::Postgresql)
        .name("testdb")
        .host("127.0.0.1", port)
        .credentials("postgres", "testpass")
        .backup_path(&ctx.create_subdir("backups"))
        .build();

    backup_mutate_restore(&target, || {
        psql(name, "DELETE FROM orders; DELETE FROM users WHERE id = 2;")?;
        Ok(())
    })
    .await
    .expect("Backup/restore cycle failed");

    assert_eq!(count(name, "users").unwrap(), 2);
    assert_eq!(count(name, "orders").unwrap(), 3);

    let constraints = |table: &str, kind: &str| -> String {
        psql(
            name,
            &format!(
                "SELECT COUNT(*) FROM pg_constraint WHERE conrelid = '{}'::regclass AND contype = '{}'",
                table, kind
            ),
        )
        .unwrap()
    };
    assert_eq!(constraints("users", "p"), "1");
    assert_eq!(constraints("orders", "p"), "1");
    assert_eq!(constraints("orders", "f"), "1");

    // The foreign key is enforced again
    assert!(psql(name, "INSERT INTO orders (user_id) VALUES (99)").is_err());

    // The trigger calls the restored function
    psql(name, "UPDATE orders SET total = total WHERE id = 1").unwrap();
    assert_eq!(
        psql(name, "SELECT updated_at IS NOT NULL FROM orders WHERE id = 1").unwrap(),
        "t"
    );

    // Sequences continue after the restored ids
    psql(name, "INSERT INTO users (name) VALUES ('cat')").unwrap();
    assert_eq!(
        psql(name, "SELECT id FROM users WHERE name = 'cat'").unwrap(),
        "3"
    );
}
