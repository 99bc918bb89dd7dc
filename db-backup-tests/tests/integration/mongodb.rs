//! MongoDB backup/restore cycle against a container

use super::common::{
    backup_mutate_restore, exec, is_docker_available, start_container, wait_until_ready,
    ContainerGuard,
};
use anyhow::Result;
use test_utils::{DatabaseType, TargetBuilder, TestContext};

fn mongosh(container: &str, script: &str) -> Result<String> {
    exec(
        container,
        &["mongosh", "--quiet", "mongodb://127.0.0.1:27017/testdb", "--eval", script],
    )
}

fn count(container: &str, collection: &str) -> Result<i64> {
    Ok(mongosh(container, &format!("db.{}.countDocuments()", collection))?.parse()?)
}

/// Server-wide count of `op` operations since startup
fn opcounter(container: &str, op: &str) -> Result<i64> {
    Ok(mongosh(
        container,
        &format!("Number(db.serverStatus().opcounters.{})", op),
    )?
    .parse()?)
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_mongodb_backup_restore_cycle() {
    if !is_docker_available() {
        println!("Docker not available, skipping test");
        return;
    }

    let container = ContainerGuard::new("db-backup-test-mongodb");
    let name = container.name();
    let port = start_container(name, "mongo:7", &[], 27017).expect("Failed to start MongoDB");
    wait_until_ready("MongoDB", 60, || {
        mongosh(name, "db.runCommand({ ping: 1 }).ok").is_ok()
    })
    .expect("MongoDB not ready");

    mongosh(
        name,
        "db.items.insertMany([
            { sku: 'a', qty: 1, price: NumberDecimal('9.99'), added: new Date(0) },
            { sku: 'b', qty: NumberLong(2), tags: ['x', 'y'] },
            { sku: 'c', nested: { deep: { value: null } } }
         ]);
         db.orders.insertMany([{ n: 1 }, { n: 2 }]);",
    )
    .expect("Failed to create test data");

    let ctx = TestContext::new();
    let target = TargetBuilder::new("mongo", DatabaseType::Mongodb)
        .name("testdb")
        .host("127.0.0.1", port)
        .without_credentials()
        .backup_path(&ctx.create_subdir("backups"))
        .build();

    backup_mutate_restore(&target, || {
        mongosh(name, "db.items.insertOne({ sku: 'd' }); db.orders.drop();")?;
        Ok(())
    })
    .await
    .expect("Backup/restore cycle failed");

    assert_eq!(count(name, "items").unwrap(), 3);
    assert_eq!(count(name, "orders").unwrap(), 2);
    assert_eq!(
        mongosh(name, "db.items.findOne({ sku: 'a' }).price.toString()").unwrap(),
        "9.99"
    );

    // Restoring identical data again must not clear or refill any collection
    let inserts = opcounter(name, "insert").unwrap();
    let deletes = opcounter(name, "delete").unwrap();
    backup_mutate_restore(&target, || Ok(()))
        .await
        .expect("Second cycle failed");
    assert_eq!(count(name, "items").unwrap(), 3);
    assert_eq!(opcounter(name, "insert").unwrap(), inserts);
    assert_eq!(opcounter(name, "delete").unwrap(), deletes);
}
