use super::types::*;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Failed to parse config file: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("Configuration file not found at {0}. Run 'init' first.")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("No target with id: {0}")]
    TargetNotFound(String),

    #[error("ID '{0}' already exists.")]
    DuplicateTarget(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn is_toml(path: &Path) -> bool {
    path.extension().map(|e| e == "toml").unwrap_or(false)
}

/// Load configuration, migrating the legacy single-target layout if needed
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let contents = fs::read_to_string(path)?;

    if is_toml(path) {
        return Ok(toml::from_str(&contents)?);
    }

    let raw: serde_json::Value = serde_json::from_str(&contents)?;
    if raw.get("targets").is_none() && raw.get("database").is_some() {
        info!("Migrating old config to multi-target format");
        let config = migrate_legacy(raw)?;
        save_config(path, &config)?;
        return Ok(config);
    }

    Ok(serde_json::from_value(raw)?)
}

/// Wrap a pre-multi-target document (`{database, backup}`) into a single target
fn migrate_legacy(raw: serde_json::Value) -> Result<Config> {
    let id = raw
        .pointer("/database/name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("default")
        .to_string();

    let target = Target {
        id,
        database: serde_json::from_value(raw["database"].clone())?,
        backup: serde_json::from_value(raw["backup"].clone())?,
    };

    Ok(Config {
        global: GlobalConfig::default(),
        targets: vec![target],
    })
}

/// Persist configuration, creating the parent directory when needed
pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let contents = if is_toml(path) {
        toml::to_string_pretty(config)?
    } else {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        serde::Serialize::serialize(config, &mut ser)?;
        String::from_utf8_lossy(&buf).to_string()
    };

    fs::write(path, contents)?;
    info!("Configuration saved to {}", path.display());
    Ok(())
}

/// Check the per-engine field requirements of a target
pub fn validate_target(target: &Target) -> Result<()> {
    let db = &target.database;
    let db_type = db.db_type;

    if target.id.trim().is_empty() {
        return Err(ConfigError::ValidationError("Target requires 'id'".to_string()));
    }

    match db_type {
        DatabaseType::Sqlite => {
            let has_path = db
                .path
                .as_ref()
                .map(|p| !p.as_os_str().is_empty())
                .unwrap_or(false);
            if !has_path {
                return Err(ConfigError::ValidationError(
                    "SQLite requires 'path'".to_string(),
                ));
            }
        }
        _ => {
            if db.name.is_empty() {
                return Err(missing(db_type, "name"));
            }
            if db.host.is_empty() {
                return Err(missing(db_type, "host"));
            }
            if db.port == 0 {
                return Err(missing(db_type, "port"));
            }
            if matches!(db_type, DatabaseType::Postgresql | DatabaseType::Mysql) {
                if db.user.is_none() {
                    return Err(missing(db_type, "user"));
                }
                // An empty password is allowed, an absent one is not
                if db.password.is_none() {
                    return Err(missing(db_type, "password"));
                }
            }
        }
    }

    if target.backup.local_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "Backup requires 'local_path'".to_string(),
        ));
    }

    if target.backup.cloud.cloud_type == CloudType::S3 {
        let s3 = &target.backup.cloud.s3;
        for (field, value) in [
            ("bucket", &s3.bucket),
            ("access_key", &s3.access_key),
            ("secret_key", &s3.secret_key),
        ] {
            if value.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "S3 requires '{}'",
                    field
                )));
            }
        }
    }

    Ok(())
}

fn missing(db_type: DatabaseType, field: &str) -> ConfigError {
    ConfigError::ValidationError(format!("{} requires '{}'", db_type, field))
}

/// Turn a free-form name into a slug-safe target id
pub fn sanitize_id(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = replaced.trim_matches('_').to_lowercase();
    if trimmed.is_empty() {
        "default".to_string()
    } else {
        trimmed
    }
}

impl Config {
    pub fn find_target(&self, id: &str) -> Result<&Target> {
        self.targets
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| ConfigError::TargetNotFound(id.to_string()))
    }

    /// Validate and append a target, rejecting duplicate ids
    pub fn add_target(&mut self, target: Target) -> Result<()> {
        if self.targets.iter().any(|t| t.id == target.id) {
            return Err(ConfigError::DuplicateTarget(target.id));
        }
        validate_target(&target)?;
        self.targets.push(target);
        Ok(())
    }

    /// Targets matching `id`, or all of them when `id` is `None`
    pub fn select_targets(&self, id: Option<&str>) -> Result<Vec<Target>> {
        select_targets(&self.targets, id)
    }
}

/// Targets matching `id`, or all of them when `id` is `None`
///
/// An unknown id and an empty selection are both errors.
pub fn select_targets(targets: &[Target], id: Option<&str>) -> Result<Vec<Target>> {
    let selected: Vec<Target> = targets
        .iter()
        .filter(|t| id.map(|id| t.id == id).unwrap_or(true))
        .cloned()
        .collect();

    if selected.is_empty() {
        return Err(match id {
            Some(id) => ConfigError::TargetNotFound(id.to_string()),
            None => ConfigError::ValidationError("No targets configured.".to_string()),
        });
    }

    Ok(selected)
}
