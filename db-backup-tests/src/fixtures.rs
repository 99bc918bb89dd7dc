//! Test fixtures and sample data

use rusqlite::{params, Connection};
use std::path::Path;

/// Create (or extend) a SQLite database with an `items` table holding `rows` rows
pub fn seed_sqlite(path: &Path, rows: usize) -> rusqlite::Result<()> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            price REAL,
            payload BLOB
        );",
    )?;

    let mut stmt = conn.prepare("INSERT INTO items (name, price, payload) VALUES (?1, ?2, ?3)")?;
    for i in 0..rows {
        stmt.execute(params![
            format!("item-{}", i),
            i as f64 * 1.5,
            vec![i as u8, 0xff, 0x00]
        ])?;
    }
    Ok(())
}

/// Row count of `table`
pub fn count_rows(path: &Path, table: &str) -> rusqlite::Result<i64> {
    let conn = Connection::open(path)?;
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
        row.get(0)
    })
}

/// Config document in the current multi-target layout
pub fn multi_target_config_json() -> &'static str {
    r#"{
    "global": {
        "log_directory": "{log_dir}",
        "log_level": "debug"
    },
    "targets": [
        {
            "id": "app",
            "database": {"type": "sqlite", "path": "{db_path}"},
            "backup": {"local_path": "{backup_path}", "schedule": "hourly", "cloud": {"type": "none"}}
        },
        {
            "id": "shop",
            "database": {"type": "postgresql", "name": "shop", "host": "db", "port": 5432, "user": "admin", "password": ""},
            "backup": {"local_path": "{backup_path}", "schedule": "daily", "cloud": {"type": "local"}}
        }
    ]
}"#
}

/// Config document in the legacy single-target layout
pub fn legacy_config_json() -> &'static str {
    r#"{
    "database": {"type": "mysql", "name": "Legacy Shop", "host": "localhost", "port": 3306, "user": "root", "password": "pw"},
    "backup": {"local_path": "{backup_path}", "schedule": "weekly", "cloud": {"type": "none"}}
}"#
}

/// Same shape as [`multi_target_config_json`], in TOML
pub fn multi_target_config_toml() -> &'static str {
    r#"
[global]
log_directory = "{log_dir}"

[[targets]]
id = "app"

[targets.database]
type = "sqlite"
path = "{db_path}"

[targets.backup]
local_path = "{backup_path}"
schedule = "hourly"

[targets.backup.cloud]
type = "none"
"#
}

/// Fill the `{placeholder}` slots of a fixture template
pub fn render(template: &str, vars: &[(&str, &Path)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), &value.display().to_string())
    })
}
