//! MySQL handler: `SHOW CREATE TABLE` plus `INSERT` dump, transactional replay

use super::DatabaseHandler;
use crate::config::{DatabaseConfig, Target};
use crate::error::BackupError;
use crate::utils::artifact::new_artifact_path;
use crate::utils::sql::{mysql_ident, mysql_literal, split_statements, statement_preview};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::{Column, Connection, Executor, Row};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, warn};

const ENGINE: &str = "MySQL";

/// Table already exists
const ER_TABLE_EXISTS: u16 = 1050;
/// Duplicate entry for key
const ER_DUP_ENTRY: u16 = 1062;

pub struct MysqlHandler;

async fn connect(db: &DatabaseConfig, with_database: bool) -> Result<MySqlConnection> {
    let mut options = MySqlConnectOptions::new()
        .host(&db.host)
        .port(db.port)
        .username(db.user().unwrap_or_default())
        .password(db.password());
    if with_database {
        options = options.database(&db.name);
    }

    let conn = MySqlConnection::connect_with(&options)
        .await
        .map_err(|e| BackupError::connectivity(ENGINE, db.endpoint(), e))?;
    debug!("Connected to MySQL {}", db.endpoint());
    Ok(conn)
}

/// Error number reported by the server, if `err` came from the server
fn server_errno(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(|e| e.number()),
        _ => None,
    }
}

/// Raw text-protocol value of column `idx`, `None` for SQL NULL
fn raw_value(row: &MySqlRow, idx: usize) -> Result<Option<Vec<u8>>> {
    row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)
        .map_err(|e| BackupError::engine(ENGINE, "decoding row", e).into())
}

/// Literal for one dumped value; bytes that are not UTF-8 are written as hex
fn value_literal(value: Option<Vec<u8>>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(bytes) => match String::from_utf8(bytes) {
            Ok(text) => mysql_literal(&text),
            Err(e) => {
                let hex: String = e.as_bytes().iter().map(|b| format!("{:02X}", b)).collect();
                format!("X'{}'", hex)
            }
        },
    }
}

/// Run one statement that returns no rows
async fn exec(conn: &mut MySqlConnection, sql: &str, action: &str) -> Result<()> {
    (&mut *conn).execute(sqlx::raw_sql(sql))
        .await
        .map_err(|e| BackupError::engine(ENGINE, action, e))?;
    Ok(())
}

async fn list_tables(conn: &mut MySqlConnection) -> Result<Vec<String>> {
    let rows = (&mut *conn).fetch_all(sqlx::raw_sql("SHOW FULL TABLES WHERE Table_type = 'BASE TABLE'"))
        .await
        .map_err(|e| BackupError::engine(ENGINE, "listing tables", e))?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(name) = raw_value(row, 0)? {
            tables.push(String::from_utf8_lossy(&name).to_string());
        }
    }
    Ok(tables)
}

async fn dump_table(
    conn: &mut MySqlConnection,
    table: &str,
    out: &mut BufWriter<File>,
) -> Result<usize> {
    let show_create = format!("SHOW CREATE TABLE {}", mysql_ident(table));
    let create = (&mut *conn).fetch_one(sqlx::raw_sql(&show_create))
        .await
        .map_err(|e| BackupError::engine(ENGINE, format!("reading definition of {}", table), e))?;
    let ddl = raw_value(&create, 1)?.unwrap_or_default();
    out.write_all(&ddl).await?;
    out.write_all(b";\n\n").await?;

    let select = format!("SELECT * FROM {}", mysql_ident(table));
    let rows = (&mut *conn).fetch_all(sqlx::raw_sql(&select))
        .await
        .map_err(|e| BackupError::engine(ENGINE, format!("reading rows of {}", table), e))?;
    let Some(first) = rows.first() else {
        return Ok(0);
    };

    let columns = first
        .columns()
        .iter()
        .map(|c| mysql_ident(c.name()))
        .collect::<Vec<_>>()
        .join(", ");

    for row in &rows {
        let mut values = Vec::with_capacity(row.len());
        for idx in 0..row.len() {
            values.push(value_literal(raw_value(row, idx)?));
        }

        let line = format!(
            "INSERT INTO {} ({}) VALUES ({});\n",
            mysql_ident(table),
            columns,
            values.join(", ")
        );
        out.write_all(line.as_bytes()).await?;
    }
    out.write_all(b"\n").await?;
    Ok(rows.len())
}

async fn dump_tables(
    conn: &mut MySqlConnection,
    tables: &[String],
    out: &mut BufWriter<File>,
) -> Result<()> {
    for table in tables {
        let rows = dump_table(conn, table, out).await?;
        debug!("Dumped {} rows from {}", rows, table);
    }
    out.flush().await?;
    Ok(())
}

/// `INSERT INTO` becomes `INSERT IGNORE INTO` so duplicate keys are skipped
fn prepare_statement(statement: &str) -> Option<String> {
    let statement = statement.trim();
    if statement.is_empty() || statement.starts_with("SET FOREIGN_KEY_CHECKS") {
        return None;
    }
    match statement.strip_prefix("INSERT INTO") {
        Some(rest) => Some(format!("INSERT IGNORE INTO{}", rest)),
        None => Some(statement.to_string()),
    }
}

/// Statements of one restore, run inside the open transaction
async fn apply_statements(
    conn: &mut MySqlConnection,
    statements: &[String],
    force: bool,
) -> Result<usize> {
    exec(conn, "SET FOREIGN_KEY_CHECKS = 0", "disabling foreign key checks").await?;

    if force {
        for table in list_tables(conn).await? {
            let drop = format!("DROP TABLE {}", mysql_ident(&table));
            exec(conn, &drop, &format!("dropping {}", table)).await?;
        }
    }

    let mut applied = 0usize;
    for statement in statements.iter().filter_map(|s| prepare_statement(s)) {
        match (&mut *conn).execute(sqlx::raw_sql(&statement)).await {
            Ok(_) => applied += 1,
            Err(e) => match server_errno(&e) {
                Some(ER_TABLE_EXISTS) => warn!("Skipping table creation: {}", e),
                Some(ER_DUP_ENTRY) => warn!("Skipping duplicate entry: {}", e),
                _ => {
                    error!("Statement failed: {} {}", statement_preview(&statement), e);
                    return Err(BackupError::partial(statement_preview(&statement), e).into());
                }
            },
        }
    }

    exec(conn, "SET FOREIGN_KEY_CHECKS = 1", "enabling foreign key checks").await?;
    Ok(applied)
}

async fn replay(conn: &mut MySqlConnection, statements: &[String], force: bool) -> Result<usize> {
    exec(conn, "START TRANSACTION", "starting transaction").await?;

    match apply_statements(conn, statements, force).await {
        Ok(applied) => {
            exec(conn, "COMMIT", "committing restore").await?;
            Ok(applied)
        }
        Err(e) => {
            if let Err(rollback) = exec(conn, "ROLLBACK", "rolling back").await {
                warn!("Rollback failed: {:#}", rollback);
            }
            error!("Restore failed, transaction rolled back: {:#}", e);
            Err(e)
        }
    }
}

#[async_trait]
impl DatabaseHandler for MysqlHandler {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn extension(&self) -> &'static str {
        "sql"
    }

    async fn backup(&self, target: &Target) -> Result<PathBuf> {
        let mut conn = connect(&target.database, true).await?;
        let tables = list_tables(&mut conn).await?;

        let backup_file = new_artifact_path(target, self.extension())?;
        let file = File::create(&backup_file)
            .await
            .with_context(|| format!("Failed to create backup file: {:?}", backup_file))?;
        let mut writer = BufWriter::new(file);

        // Drop the partial dump
        if let Err(e) = dump_tables(&mut conn, &tables, &mut writer).await {
            if let Err(rm) = tokio::fs::remove_file(&backup_file).await {
                warn!("Failed to remove partial dump {:?}: {}", backup_file, rm);
            }
            return Err(e);
        }

        if let Err(e) = conn.close().await {
            debug!("MySQL connection close failed: {}", e);
        }

        info!("MySQL backup created: {}", backup_file.display());
        Ok(backup_file)
    }

    /// Replay the dump in one transaction with foreign key checks off
    ///
    /// With `force` the database is dropped first; otherwise existing tables
    /// and duplicate rows are kept and reported as warnings.
    async fn restore(&self, target: &Target, backup_file: &Path, force: bool) -> Result<()> {
        let db = &target.database;
        let script = tokio::fs::read_to_string(backup_file)
            .await
            .with_context(|| format!("Failed to read backup file: {:?}", backup_file))?;

        {
            let mut conn = connect(db, false).await?;
            if force {
                info!("Dropping database {} due to --force flag", mysql_ident(&db.name));
                let drop = format!("DROP DATABASE IF EXISTS {}", mysql_ident(&db.name));
                exec(&mut conn, &drop, "dropping database").await?;
            }
            let create = format!("CREATE DATABASE IF NOT EXISTS {}", mysql_ident(&db.name));
            exec(&mut conn, &create, "creating database").await?;
            let _ = conn.close().await;
        }

        let mut conn = connect(db, true).await?;
        let statements = split_statements(&script);
        let applied = replay(&mut conn, &statements, force).await?;
        let _ = conn.close().await;

        info!("MySQL database restored: {} ({} statements)", db.name, applied);
        Ok(())
    }
}
