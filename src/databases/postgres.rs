//! PostgreSQL handler: catalog-driven plain-SQL dump of the `public` schema
//!
//! The dump is written in a fixed order so it can be replayed top to bottom
//! into an empty database:
//!
//! 1. sequences (definition plus current value)
//! 2. table definitions built from `pg_attribute`
//! 3. table constraints
//! 4. row data as `INSERT` statements
//! 5. indexes (constraint-backed ones come with step 3)
//! 6. views
//! 7. triggers
//! 8. functions
//!
//! Primary keys are also written inline in step 2. On replay the primary key
//! constraints of step 3 are skipped, and foreign keys and triggers are held
//! back until the rest of the script (rows and functions) has run.
//!
//! Restore drops and recreates the database, so it is always destructive.

use super::DatabaseHandler;
use crate::config::{DatabaseConfig, Target};
use crate::error::BackupError;
use crate::utils::artifact::new_artifact_path;
use crate::utils::sql::{pg_ident, pg_literal, split_pg_statements, statement_preview};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, error, info, warn};

const ENGINE: &str = "PostgreSQL";

pub struct PostgresHandler;

/// Result set with every value in text form
struct TextRows {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

async fn connect(db: &DatabaseConfig, dbname: &str) -> Result<Client> {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&db.host)
        .port(db.port)
        .dbname(dbname)
        .user(db.user().unwrap_or_default())
        .password(db.password())
        .application_name("db-backup");

    let (client, connection) = config
        .connect(NoTls)
        .await
        .map_err(|e| BackupError::connectivity(ENGINE, db.endpoint(), e))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("PostgreSQL connection closed with error: {}", e);
        }
    });

    debug!("Connected to PostgreSQL {} database '{}'", db.endpoint(), dbname);
    Ok(client)
}

/// Run `sql` over the simple query protocol so every value arrives as text
async fn query_text(client: &Client, sql: &str, action: &str) -> Result<TextRows> {
    let messages = client
        .simple_query(sql)
        .await
        .map_err(|e| BackupError::engine(ENGINE, action, e))?;

    let mut out = TextRows {
        columns: Vec::new(),
        rows: Vec::new(),
    };
    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            if out.columns.is_empty() {
                out.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
            }
            out.rows
                .push((0..row.len()).map(|i| row.get(i).map(str::to_string)).collect());
        }
    }
    Ok(out)
}

/// First column of every row, skipping NULLs
async fn query_column(client: &Client, sql: &str, action: &str) -> Result<Vec<String>> {
    let rows = query_text(client, sql, action).await?;
    Ok(rows
        .rows
        .into_iter()
        .filter_map(|row| row.into_iter().next().flatten())
        .collect())
}

fn value_or<'a>(row: &'a [Option<String>], idx: usize, default: &'a str) -> &'a str {
    row.get(idx).and_then(|v| v.as_deref()).unwrap_or(default)
}

/// `public.{table}` as a regclass literal
fn regclass(table: &str) -> String {
    pg_literal(&format!("public.{}", pg_ident(table)))
}

async fn dump_sequences(client: &Client, out: &mut Vec<String>) -> Result<()> {
    out.push("-- Sequences".to_string());
    let sequences = query_text(
        client,
        "SELECT sequencename, start_value, increment_by, min_value, max_value, cache_size, cycle \
         FROM pg_sequences WHERE schemaname = 'public' ORDER BY sequencename",
        "listing sequences",
    )
    .await?;

    for seq in &sequences.rows {
        let name = value_or(seq, 0, "");
        let cycle = if value_or(seq, 6, "f") == "t" {
            "CYCLE"
        } else {
            "NO CYCLE"
        };

        out.push(format!(
            "CREATE SEQUENCE IF NOT EXISTS {}\n    START WITH {}\n    INCREMENT BY {}\n    MINVALUE {}\n    MAXVALUE {}\n    CACHE {}\n    {};",
            pg_ident(name),
            value_or(seq, 1, "1"),
            value_or(seq, 2, "1"),
            value_or(seq, 3, "1"),
            value_or(seq, 4, "9223372036854775807"),
            value_or(seq, 5, "1"),
            cycle
        ));

        let state = query_text(
            client,
            &format!("SELECT last_value, is_called FROM {}", pg_ident(name)),
            "reading sequence state",
        )
        .await?;
        if let Some(row) = state.rows.first() {
            let is_called = if value_or(row, 1, "f") == "t" {
                "true"
            } else {
                "false"
            };
            out.push(format!(
                "SELECT setval({}, {}, {});",
                pg_literal(&pg_ident(name)),
                value_or(row, 0, "1"),
                is_called
            ));
        }
        out.push(String::new());
    }
    Ok(())
}

async fn dump_table_definitions(
    client: &Client,
    tables: &[String],
    out: &mut Vec<String>,
) -> Result<()> {
    out.push("-- Tables".to_string());
    for table in tables {
        let columns = query_text(
            client,
            &format!(
                "SELECT a.attname, pg_catalog.format_type(a.atttypid, a.atttypmod), a.attnotnull, \
                 pg_get_expr(ad.adbin, ad.adrelid) \
                 FROM pg_attribute a \
                 LEFT JOIN pg_attrdef ad ON a.attrelid = ad.adrelid AND a.attnum = ad.adnum \
                 WHERE a.attrelid = {}::regclass AND a.attnum > 0 AND NOT a.attisdropped \
                 ORDER BY a.attnum",
                regclass(table)
            ),
            "reading table columns",
        )
        .await?;

        let mut defs: Vec<String> = columns
            .rows
            .iter()
            .map(|col| {
                let mut def = format!("{} {}", pg_ident(value_or(col, 0, "")), value_or(col, 1, "text"));
                if let Some(default) = col.get(3).and_then(|v| v.as_deref()) {
                    def.push_str(" DEFAULT ");
                    def.push_str(default);
                }
                if value_or(col, 2, "f") == "t" {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();

        // Inline, so the later `ADD CONSTRAINT ... PRIMARY KEY` is a duplicate
        defs.extend(
            query_column(
                client,
                &format!(
                    "SELECT 'CONSTRAINT ' || quote_ident(conname) || ' ' || pg_get_constraintdef(oid, true) \
                     FROM pg_constraint WHERE conrelid = {}::regclass AND contype = 'p'",
                    regclass(table)
                ),
                "reading primary key",
            )
            .await?,
        );

        out.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n);",
            pg_ident(table),
            defs.join(",\n  ")
        ));
        out.push(String::new());
    }
    Ok(())
}

async fn dump_constraints(client: &Client, tables: &[String], out: &mut Vec<String>) -> Result<()> {
    out.push("-- Constraints".to_string());
    for table in tables {
        let constraints = query_text(
            client,
            &format!(
                "SELECT conname, pg_get_constraintdef(c.oid, true) \
                 FROM pg_constraint c JOIN pg_class t ON c.conrelid = t.oid \
                 WHERE t.relname = {} AND t.relnamespace = 'public'::regnamespace \
                 AND c.contype IN ('p', 'u', 'f', 'c', 'x') \
                 ORDER BY conname",
                pg_literal(table)
            ),
            "reading constraints",
        )
        .await?;

        for row in &constraints.rows {
            out.push(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {};",
                pg_ident(table),
                pg_ident(value_or(row, 0, "")),
                value_or(row, 1, "")
            ));
        }
    }
    out.push(String::new());
    Ok(())
}

async fn dump_table_data(client: &Client, tables: &[String], out: &mut Vec<String>) -> Result<()> {
    out.push("-- Table Data".to_string());
    for table in tables {
        let data = query_text(
            client,
            &format!("SELECT * FROM {}", pg_ident(table)),
            "reading table data",
        )
        .await?;
        if data.rows.is_empty() {
            continue;
        }

        let columns: Vec<String> = data.columns.iter().map(|c| pg_ident(c)).collect();
        let columns = columns.join(", ");
        for row in &data.rows {
            let values: Vec<String> = row
                .iter()
                .map(|v| v.as_deref().map(pg_literal).unwrap_or_else(|| "NULL".to_string()))
                .collect();
            out.push(format!(
                "INSERT INTO {} ({}) VALUES ({});",
                pg_ident(table),
                columns,
                values.join(", ")
            ));
        }
        debug!("Dumped {} rows from {}", data.rows.len(), table);
        out.push(String::new());
    }
    Ok(())
}

/// Append one `-- {title}` section of catalog definitions, each ended with `;`
async fn dump_definitions(client: &Client, title: &str, sql: &str, out: &mut Vec<String>) -> Result<()> {
    out.push(format!("-- {}", title));
    let action = format!("reading {}", title.to_lowercase());
    for def in query_column(client, sql, &action).await? {
        out.push(format!("{};", def.trim_end().trim_end_matches(';')));
    }
    out.push(String::new());
    Ok(())
}

async fn dump_database(client: &Client, db_name: &str) -> Result<Vec<String>> {
    let mut out = vec![
        "-- PostgreSQL Backup".to_string(),
        format!("-- Database: {}", db_name),
        String::new(),
    ];

    dump_sequences(client, &mut out).await?;

    let tables = query_column(
        client,
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_type = 'BASE TABLE' ORDER BY table_name",
        "listing tables",
    )
    .await?;

    dump_table_definitions(client, &tables, &mut out).await?;
    dump_constraints(client, &tables, &mut out).await?;
    dump_table_data(client, &tables, &mut out).await?;

    dump_definitions(
        client,
        "Indexes",
        "SELECT indexdef FROM pg_indexes \
         WHERE schemaname = 'public' AND indexname NOT LIKE '%_pkey' \
         AND indexname NOT IN (SELECT conname FROM pg_constraint \
             WHERE connamespace = 'public'::regnamespace AND contype IN ('p', 'u', 'x')) \
         ORDER BY indexname",
        &mut out,
    )
    .await?;
    dump_definitions(
        client,
        "Views",
        "SELECT 'CREATE OR REPLACE VIEW ' || quote_ident(viewname) || ' AS ' || definition \
         FROM pg_views WHERE schemaname = 'public' ORDER BY viewname",
        &mut out,
    )
    .await?;
    dump_definitions(
        client,
        "Triggers",
        "SELECT pg_get_triggerdef(t.oid) FROM pg_trigger t \
         JOIN pg_class c ON t.tgrelid = c.oid \
         WHERE c.relnamespace = 'public'::regnamespace AND NOT t.tgisinternal \
         ORDER BY t.tgname",
        &mut out,
    )
    .await?;
    dump_definitions(
        client,
        "Functions",
        "SELECT pg_get_functiondef(p.oid) FROM pg_proc p \
         WHERE p.pronamespace = 'public'::regnamespace AND p.prokind IN ('f', 'p') \
         ORDER BY p.proname",
        &mut out,
    )
    .await?;

    info!("PostgreSQL dump covers {} tables", tables.len());
    Ok(out)
}

fn starts_with_ignore_case(statement: &str, prefix: &str) -> bool {
    statement
        .trim_start()
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

fn is_foreign_key_constraint(statement: &str) -> bool {
    if !starts_with_ignore_case(statement, "ALTER TABLE") {
        return false;
    }
    let upper = statement.to_uppercase();
    upper.contains("ADD CONSTRAINT") && upper.contains("FOREIGN KEY")
}

/// Primary keys already come with `CREATE TABLE`
fn is_primary_key_constraint(statement: &str) -> bool {
    if !starts_with_ignore_case(statement, "ALTER TABLE") || is_foreign_key_constraint(statement) {
        return false;
    }
    let upper = statement.to_uppercase();
    upper.contains("ADD CONSTRAINT") && (statement.contains("_pkey") || upper.contains("PRIMARY KEY"))
}

fn is_trigger(statement: &str) -> bool {
    ["CREATE TRIGGER", "CREATE CONSTRAINT TRIGGER", "CREATE OR REPLACE TRIGGER"]
        .iter()
        .any(|prefix| starts_with_ignore_case(statement, prefix))
}

/// Statements in replay order
///
/// Primary key constraints are dropped. Foreign keys run after all rows are
/// in, then triggers after the functions they call.
fn replay_order(statements: &[String]) -> Vec<&str> {
    let mut ordered = Vec::with_capacity(statements.len());
    let mut foreign_keys = Vec::new();
    let mut triggers = Vec::new();

    for statement in statements {
        if is_foreign_key_constraint(statement) {
            foreign_keys.push(statement.as_str());
        } else if is_primary_key_constraint(statement) {
            continue;
        } else if is_trigger(statement) {
            triggers.push(statement.as_str());
        } else {
            ordered.push(statement.as_str());
        }
    }

    ordered.extend(foreign_keys);
    ordered.extend(triggers);
    ordered
}

#[async_trait]
impl DatabaseHandler for PostgresHandler {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn extension(&self) -> &'static str {
        "sql"
    }

    async fn backup(&self, target: &Target) -> Result<PathBuf> {
        let db = &target.database;
        let client = connect(db, &db.name).await?;
        let lines = dump_database(&client, &db.name).await?;

        let backup_file = new_artifact_path(target, self.extension())?;
        let file = tokio::fs::File::create(&backup_file)
            .await
            .with_context(|| format!("Failed to create backup file: {:?}", backup_file))?;
        let mut writer = BufWriter::new(file);
        for line in &lines {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;

        info!("PostgreSQL backup created: {}", backup_file.display());
        Ok(backup_file)
    }

    /// Drop and recreate the database, then replay the dump
    async fn restore(&self, target: &Target, backup_file: &Path, _force: bool) -> Result<()> {
        let db = &target.database;
        let target_db = db.name.as_str();
        let admin_db = if target_db == "postgres" {
            "template1"
        } else {
            "postgres"
        };

        let script = tokio::fs::read_to_string(backup_file)
            .await
            .with_context(|| format!("Failed to read backup file: {:?}", backup_file))?;

        {
            let admin = connect(db, admin_db).await?;
            admin
                .batch_execute(&format!(
                    "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                     WHERE datname = {} AND pid <> pg_backend_pid()",
                    pg_literal(target_db)
                ))
                .await
                .map_err(|e| BackupError::engine(ENGINE, "terminating sessions", e))?;
            admin
                .batch_execute(&format!("DROP DATABASE IF EXISTS {}", pg_ident(target_db)))
                .await
                .map_err(|e| BackupError::engine(ENGINE, "dropping database", e))?;
            admin
                .batch_execute(&format!("CREATE DATABASE {}", pg_ident(target_db)))
                .await
                .map_err(|e| BackupError::engine(ENGINE, "creating database", e))?;
            info!("Recreated PostgreSQL database '{}'", target_db);
        }

        let client = connect(db, target_db).await?;
        let statements = split_pg_statements(&script);
        let mut applied = 0usize;

        for statement in replay_order(&statements) {
            if let Err(e) = client.batch_execute(statement).await {
                error!("SQL execution failed:\n{}\nError: {}", statement, e);
                return Err(BackupError::partial(statement_preview(statement), e).into());
            }
            applied += 1;
        }

        info!(
            "PostgreSQL database restored: {} ({} statements)",
            target_db, applied
        );
        Ok(())
    }
}
