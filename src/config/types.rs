use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub targets: Vec<Target>,
}

/// Process-wide settings (logging)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_max_files")]
    pub log_max_files: u32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_level: default_log_level(),
            log_max_files: default_log_max_files(),
        }
    }
}

/// One database plus its backup policy
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Target {
    /// Unique, slug-safe identifier
    pub id: String,
    pub database: DatabaseConfig,
    pub backup: BackupConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Postgresql,
    Mysql,
    Mongodb,
    Sqlite,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Postgresql => "postgresql",
            DatabaseType::Mysql => "mysql",
            DatabaseType::Mongodb => "mongodb",
            DatabaseType::Sqlite => "sqlite",
        }
    }

    /// Extension of the uncompressed artifact, without the dot
    pub fn artifact_extension(&self) -> &'static str {
        match self {
            DatabaseType::Sqlite => "db",
            DatabaseType::Postgresql | DatabaseType::Mysql => "sql",
            DatabaseType::Mongodb => "archive",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseType::Postgresql => 5432,
            DatabaseType::Mysql => 3306,
            DatabaseType::Mongodb => 27017,
            DatabaseType::Sqlite => 0,
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseType::Postgresql),
            "mysql" => Ok(DatabaseType::Mysql),
            "mongodb" | "mongo" => Ok(DatabaseType::Mongodb),
            "sqlite" => Ok(DatabaseType::Sqlite),
            other => Err(format!("Unsupported DBMS: {}", other)),
        }
    }
}

/// Connection settings for the target database
///
/// Fields are optional on disk; [`super::validate_target`] enforces which ones
/// each engine needs before any backup or restore.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub db_type: DatabaseType,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// SQLite database file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// MongoDB authentication database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_source: Option<String>,
}

impl DatabaseConfig {
    /// Name used in artifact filenames; SQLite falls back to the file stem
    pub fn artifact_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }

        self.path
            .as_deref()
            .and_then(Path::file_stem)
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "default".to_string())
    }

    /// `host:port`, used in log lines and connectivity errors
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// User name, treating an empty string as absent
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref().filter(|u| !u.is_empty())
    }

    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }
}

/// Backup policy for a target
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackupConfig {
    /// Staging directory for raw and compressed artifacts
    #[serde(default)]
    pub local_path: PathBuf,

    #[serde(default)]
    pub schedule: Schedule,

    #[serde(default)]
    pub cloud: CloudConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    Hourly,
    #[default]
    Daily,
    Weekly,
}

impl Schedule {
    pub fn interval(&self) -> Duration {
        match self {
            Schedule::Hourly => Duration::from_secs(60 * 60),
            Schedule::Daily => Duration::from_secs(24 * 60 * 60),
            Schedule::Weekly => Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Schedule::Hourly => "hourly",
            Schedule::Daily => "daily",
            Schedule::Weekly => "weekly",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hourly" => Ok(Schedule::Hourly),
            "daily" => Ok(Schedule::Daily),
            "weekly" => Ok(Schedule::Weekly),
            other => Err(format!("Unsupported schedule: {}", other)),
        }
    }
}

/// Remote storage selection
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CloudConfig {
    #[serde(rename = "type", default)]
    pub cloud_type: CloudType,

    #[serde(default)]
    pub s3: S3Config,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CloudType {
    #[default]
    None,
    Local,
    S3,
}

impl fmt::Display for CloudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloudType::None => "none",
            CloudType::Local => "local",
            CloudType::S3 => "s3",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for CloudType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(CloudType::None),
            "local" => Ok(CloudType::Local),
            "s3" => Ok(CloudType::S3),
            other => Err(format!("Unsupported storage type: {}", other)),
        }
    }
}

/// S3-compatible bucket credentials
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom endpoint for MinIO and friends (forces path-style addressing)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl S3Config {
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or("us-east-1")
    }
}

// Default value functions

fn default_log_directory() -> PathBuf { PathBuf::from("~/.db_backup") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
