//! Fluent API for building test targets and configurations

use db_backup::config::{
    BackupConfig, CloudConfig, CloudType, Config, DatabaseConfig, DatabaseType, GlobalConfig,
    S3Config, Schedule, Target,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for a single backup target
#[derive(Debug, Clone)]
pub struct TargetBuilder {
    target: Target,
}

impl TargetBuilder {
    /// Target for a server engine with the engine's default port
    pub fn new(id: &str, db_type: DatabaseType) -> Self {
        Self {
            target: Target {
                id: id.to_string(),
                database: DatabaseConfig {
                    db_type,
                    name: "testdb".to_string(),
                    host: "localhost".to_string(),
                    port: db_type.default_port(),
                    user: Some("test".to_string()),
                    password: Some("testpass".to_string()),
                    path: None,
                    auth_source: None,
                },
                backup: BackupConfig {
                    local_path: PathBuf::from("/tmp/db-backup-tests"),
                    schedule: Schedule::Daily,
                    cloud: CloudConfig::default(),
                },
            },
        }
    }

    /// SQLite target backed by the file at `path`
    pub fn sqlite(id: &str, path: &Path) -> Self {
        let mut builder = Self::new(id, DatabaseType::Sqlite);
        let db = &mut builder.target.database;
        db.name = String::new();
        db.host = String::new();
        db.port = 0;
        db.user = None;
        db.password = None;
        db.path = Some(path.to_path_buf());
        builder
    }

    pub fn name(mut self, name: &str) -> Self {
        self.target.database.name = name.to_string();
        self
    }

    pub fn host(mut self, host: &str, port: u16) -> Self {
        self.target.database.host = host.to_string();
        self.target.database.port = port;
        self
    }

    pub fn credentials(mut self, user: &str, password: &str) -> Self {
        self.target.database.user = Some(user.to_string());
        self.target.database.password = Some(password.to_string());
        self
    }

    pub fn without_credentials(mut self) -> Self {
        self.target.database.user = None;
        self.target.database.password = None;
        self
    }

    pub fn backup_path(mut self, path: &Path) -> Self {
        self.target.backup.local_path = path.to_path_buf();
        self
    }

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.target.backup.schedule = schedule;
        self
    }

    /// Local cloud type (`type = "local"`)
    pub fn local_cloud(mut self) -> Self {
        self.target.backup.cloud.cloud_type = CloudType::Local;
        self
    }

    pub fn s3(mut self, bucket: &str) -> Self {
        self.target.backup.cloud = CloudConfig {
            cloud_type: CloudType::S3,
            s3: S3Config {
                bucket: bucket.to_string(),
                access_key: "test-access".to_string(),
                secret_key: "test-secret".to_string(),
                region: None,
                endpoint: Some("http://localhost:9000".to_string()),
            },
        };
        self
    }

    pub fn build(self) -> Target {
        self.target
    }
}

/// Builder for a whole configuration living in its own temp directory
pub struct ConfigBuilder {
    temp_dir: TempDir,
    global: GlobalConfig,
    targets: Vec<Target>,
}

impl ConfigBuilder {
    /// Empty config whose logs go to `<temp>/logs`
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let log_directory = temp_dir.path().join("logs");
        fs::create_dir_all(&log_directory).expect("Failed to create log directory");

        let global = GlobalConfig {
            log_directory,
            log_level: "info".to_string(),
            log_max_files: 5,
        };

        Self {
            temp_dir,
            global,
            targets: Vec::new(),
        }
    }

    /// Add a SQLite target whose staging directory is `<temp>/backups/<id>`
    pub fn add_sqlite_target(mut self, id: &str, db_path: &Path) -> Self {
        let backup_path = self.temp_dir.path().join("backups").join(id);
        self.targets
            .push(TargetBuilder::sqlite(id, db_path).backup_path(&backup_path).build());
        self
    }

    pub fn add_target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_log_level(mut self, level: &str) -> Self {
        self.global.log_level = level.to_string();
        self
    }

    /// Get the temp directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Build the Config
    pub fn build(self) -> Config {
        Config {
            global: self.global,
            targets: self.targets,
        }
    }

    /// Build the Config and keep the temp directory alive with it
    pub fn persist(self) -> (Config, TempDir) {
        let config = Config {
            global: self.global,
            targets: self.targets,
        };
        (config, self.temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
