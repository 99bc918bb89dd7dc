//! MongoDB handler: JSON archive of every collection in canonical Extended JSON
//!
//! Archive layout:
//!
//! ```json
//! {
//!   "metadata": {"database": "...", "created_at": "...", "mongo_version": "...", "driver_version": "..."},
//!   "collections": {"users": [{"_id": {"$oid": "..."}, ...}], ...}
//! }
//! ```
//!
//! Restore leaves a collection alone when its current documents already equal
//! the archived ones (as a multiset); otherwise the collection is cleared and
//! refilled.

use super::DatabaseHandler;
use crate::config::{DatabaseConfig, Target};
use crate::error::BackupError;
use crate::utils::artifact::new_artifact_path;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use mongodb::{Client, Database};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const ENGINE: &str = "MongoDB";
const DEFAULT_AUTH_SOURCE: &str = "admin";
/// `mongodb` driver requirement from Cargo.toml
const DRIVER_VERSION: &str = "2.8";

pub struct MongoHandler;

/// Parsed archive file
struct Archive {
    database: Option<String>,
    collections: Vec<(String, Vec<Document>)>,
}

async fn connect(db: &DatabaseConfig) -> Result<(Client, Database)> {
    let credential = match db.user() {
        Some(user) if !db.password().is_empty() => Some(
            Credential::builder()
                .username(user.to_string())
                .password(db.password().to_string())
                .source(
                    db.auth_source
                        .clone()
                        .unwrap_or_else(|| DEFAULT_AUTH_SOURCE.to_string()),
                )
                .build(),
        ),
        _ => None,
    };

    let options = ClientOptions::builder()
        .hosts(vec![ServerAddress::Tcp {
            host: db.host.clone(),
            port: Some(db.port),
        }])
        .credential(credential)
        .app_name("db-backup".to_string())
        .server_selection_timeout(Duration::from_secs(10))
        .build();

    let client = Client::with_options(options)
        .map_err(|e| BackupError::connectivity(ENGINE, db.endpoint(), e))?;
    let database = client.database(&db.name);

    // The driver connects lazily; ping so a bad endpoint or login fails here
    database
        .run_command(doc! { "ping": 1 }, None)
        .await
        .map_err(|e| BackupError::connectivity(ENGINE, db.endpoint(), e))?;

    debug!("Connected to MongoDB {}", db.endpoint());
    Ok((client, database))
}

async fn collection_names(database: &Database) -> Result<Vec<String>> {
    let mut names = database
        .list_collection_names(doc! { "type": "collection" })
        .await
        .map_err(|e| BackupError::engine(ENGINE, "listing collections", e))?;
    names.retain(|n| !n.starts_with("system."));
    names.sort();
    Ok(names)
}

async fn read_collection(database: &Database, name: &str) -> Result<Vec<Document>> {
    let cursor = database
        .collection::<Document>(name)
        .find(None, None)
        .await
        .map_err(|e| BackupError::engine(ENGINE, format!("reading {}", name), e))?;
    let documents = cursor
        .try_collect()
        .await
        .map_err(|e| BackupError::engine(ENGINE, format!("reading {}", name), e))?;
    Ok(documents)
}

/// Serialize with object keys sorted at every level
fn canonical_json(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                canonical_json(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonical_json(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn document_to_json(document: &Document) -> Value {
    Bson::Document(document.clone()).into_canonical_extjson()
}

fn json_to_document(collection: &str, value: Value) -> Result<Document> {
    match Bson::try_from(value) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(BackupError::integrity(format!(
            "Collection '{}' holds a non-document entry: {}",
            collection, other
        ))
        .into()),
        Err(e) => Err(BackupError::integrity(format!(
            "Collection '{}' holds invalid Extended JSON: {}",
            collection, e
        ))
        .into()),
    }
}

/// Order-independent fingerprint of a set of documents (duplicates count)
fn fingerprint<'a>(documents: impl IntoIterator<Item = &'a Document>) -> Vec<String> {
    let mut keys: Vec<String> = documents
        .into_iter()
        .map(|d| {
            let mut out = String::new();
            canonical_json(&document_to_json(d), &mut out);
            out
        })
        .collect();
    keys.sort();
    keys
}

fn parse_archive(raw: &[u8]) -> Result<Archive> {
    let data: Value = serde_json::from_slice(raw)
        .map_err(|e| BackupError::integrity(format!("Invalid backup file format: {}", e)))?;

    let database = data
        .pointer("/metadata/database")
        .and_then(Value::as_str)
        .map(str::to_string);

    let Some(Value::Object(collections)) = data.get("collections").cloned() else {
        return Err(
            BackupError::integrity("Invalid backup file format: missing 'collections'").into(),
        );
    };

    let mut parsed = Vec::with_capacity(collections.len());
    for (name, docs) in collections {
        let Value::Array(docs) = docs else {
            return Err(BackupError::integrity(format!(
                "Invalid backup file format: collection '{}' is not a list",
                name
            ))
            .into());
        };
        let documents = docs
            .into_iter()
            .map(|d| json_to_document(&name, d))
            .collect::<Result<Vec<_>>>()?;
        parsed.push((name, documents));
    }

    Ok(Archive {
        database,
        collections: parsed,
    })
}

#[async_trait]
impl DatabaseHandler for MongoHandler {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn extension(&self) -> &'static str {
        "archive"
    }

    async fn backup(&self, target: &Target) -> Result<PathBuf> {
        let db = &target.database;
        let (client, database) = connect(db).await?;

        let build_info = client
            .database("admin")
            .run_command(doc! { "buildInfo": 1 }, None)
            .await
            .map_err(|e| BackupError::engine(ENGINE, "reading server version", e))?;
        let server_version = build_info.get_str("version").unwrap_or("unknown").to_string();

        let mut collections = Map::new();
        for name in collection_names(&database).await? {
            let documents = read_collection(&database, &name).await?;
            debug!("Dumped {} documents from {}", documents.len(), name);
            let docs: Vec<Value> = documents.iter().map(document_to_json).collect();
            collections.insert(name, Value::Array(docs));
        }

        let archive = json!({
            "metadata": {
                "database": db.name,
                "created_at": Local::now().to_rfc3339(),
                "mongo_version": server_version,
                "driver_version": DRIVER_VERSION,
            },
            "collections": collections,
        });

        let backup_file = new_artifact_path(target, self.extension())?;
        let bytes = serde_json::to_vec(&archive).context("Failed to serialize archive")?;
        tokio::fs::write(&backup_file, bytes)
            .await
            .with_context(|| format!("Failed to write backup file: {:?}", backup_file))?;

        info!("MongoDB backup created: {}", backup_file.display());
        Ok(backup_file)
    }

    async fn restore(&self, target: &Target, backup_file: &Path, _force: bool) -> Result<()> {
        let db = &target.database;
        let raw = tokio::fs::read(backup_file)
            .await
            .with_context(|| format!("Failed to read backup file: {:?}", backup_file))?;
        let archive = parse_archive(&raw)?;

        if archive.database.as_deref() != Some(db.name.as_str()) {
            warn!(
                "Backup database name ({}) does not match target database ({})",
                archive.database.as_deref().unwrap_or("unknown"),
                db.name
            );
        }

        let (_client, database) = connect(db).await?;
        let existing: HashSet<String> = collection_names(&database).await?.into_iter().collect();

        for (name, documents) in archive.collections {
            let collection = database.collection::<Document>(&name);

            if existing.contains(&name) {
                let current = read_collection(&database, &name).await?;
                if fingerprint(&current) == fingerprint(&documents) {
                    info!("Skipping collection {}: identical data", name);
                    continue;
                }

                info!("Clearing and restoring collection {}", name);
                collection
                    .delete_many(doc! {}, None)
                    .await
                    .map_err(|e| BackupError::partial(name.clone(), e))?;
            }

            if !documents.is_empty() {
                let count = documents.len();
                collection
                    .insert_many(documents, None)
                    .await
                    .map_err(|e| BackupError::partial(name.clone(), e))?;
                debug!("Inserted {} documents into {}", count, name);
            }
        }

        info!("MongoDB database restored: {}", db.name);
        Ok(())
    }
}
