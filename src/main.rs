use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use db_backup::config::{
    self, sanitize_id, BackupConfig, CloudConfig, CloudType, Config, ConfigError,
    DatabaseConfig, DatabaseType, S3Config, Schedule, Target,
};
use db_backup::managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
use db_backup::{schedule_backups, BackupManager, RestoreOutcome};
use dialoguer::{Input, Password, Select};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "db-backup")]
#[command(about = "Database backup, restore and scheduling", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value_os_t = config::default_config_path())]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a backup target to the configuration
    Init(InitArgs),

    /// Back up all targets or a specific one
    Backup {
        /// Target ID (all targets if omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Restore a target from a backup
    Restore {
        /// Target ID
        #[arg(long)]
        id: String,

        /// Backup file (latest if omitted)
        #[arg(long)]
        file: Option<String>,

        /// Skip confirmation and allow destructive restore steps
        #[arg(long)]
        force: bool,

        /// Pick the backup from a list
        #[arg(long)]
        interactive: bool,
    },

    /// Run scheduled backups until interrupted
    Schedule {
        /// Target ID (all targets if omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// List configured targets
    List {
        /// Also list each target's backup files
        #[arg(long)]
        show_backups: bool,
    },
}

#[derive(Args)]
struct InitArgs {
    /// Target ID (derived from the database name if omitted)
    #[arg(long)]
    id: Option<String>,

    /// Database type (postgresql/mysql/mongodb/sqlite)
    #[arg(long)]
    db_type: Option<DatabaseType>,

    /// Database name, or file path for SQLite
    #[arg(long)]
    db_name: Option<String>,

    #[arg(long)]
    db_host: Option<String>,

    #[arg(long)]
    db_port: Option<u16>,

    #[arg(long)]
    db_user: Option<String>,

    #[arg(long)]
    db_password: Option<String>,

    /// Local backup (staging) directory
    #[arg(long)]
    backup_path: Option<PathBuf>,

    /// hourly, daily or weekly
    #[arg(long)]
    schedule: Option<Schedule>,

    /// none, local or s3
    #[arg(long)]
    cloud: Option<CloudType>,

    #[arg(long)]
    s3_bucket: Option<String>,

    #[arg(long)]
    s3_access_key: Option<String>,

    #[arg(long)]
    s3_secret_key: Option<String>,

    #[arg(long)]
    s3_region: Option<String>,

    /// Custom S3-compatible endpoint (MinIO, R2)
    #[arg(long)]
    s3_endpoint: Option<String>,

    /// Prompt for the database type even if given
    #[arg(long)]
    interactive: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init(args) => {
            // No config (and so no log settings) exists yet
            init_console_logging();
            handle_init(&cli.config, args)?;
        }

        Commands::Backup { id } => {
            let (config, _log_guard) = load(&cli.config)?;
            let targets = config.select_targets(id.as_deref())?;
            for target in &targets {
                info!("Backing up target: {}", target.id);
            }
            let artifacts = BackupManager::new().backup_all(&targets).await?;
            for artifact in artifacts {
                println!("✓ {}", artifact.display());
            }
        }

        Commands::Restore {
            id,
            file,
            force,
            interactive,
        } => {
            let (config, _log_guard) = load(&cli.config)?;
            let manager = BackupManager::new();
            let target = config.find_target(&id)?.clone();
            let Some(backup_file) = choose_backup(&manager, &target, file, interactive)? else {
                error!("No backups found for target: {}", id);
                std::process::exit(1);
            };

            info!("Restoring target: {} from {}", id, backup_file);
            match manager.perform_restore(&target, &backup_file, force).await? {
                RestoreOutcome::Restored => println!("✓ Restore completed for target '{}'", id),
                RestoreOutcome::Cancelled => println!("Restore cancelled"),
            }
        }

        Commands::Schedule { id } => {
            let (config, _log_guard) = load(&cli.config)?;
            let manager = Arc::new(BackupManager::new());
            schedule_backups(manager, &config.targets, id.as_deref()).await?;
        }

        Commands::List { show_backups } => {
            let (config, _log_guard) = load(&cli.config)?;
            print_targets(&BackupManager::new(), &config, show_backups)?;
        }
    }

    Ok(())
}

/// Load the config and start logging with its settings
fn load(config_path: &Path) -> Result<(Config, LogGuard)> {
    let config = config::load_config(config_path)?;
    let guard = init_logging(&LoggingConfig::from_global(&config.global))?;
    Ok((config, guard))
}

/// Explicit file, interactive pick, or the latest backup
fn choose_backup(
    manager: &BackupManager,
    target: &Target,
    file: Option<String>,
    interactive: bool,
) -> Result<Option<String>> {
    if let Some(file) = file {
        return Ok(Some(file));
    }

    if interactive {
        let backups: Vec<String> = manager
            .list_backups(target)?
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        if backups.is_empty() {
            return Ok(None);
        }
        let selection = Select::new()
            .with_prompt("Select backup to restore")
            .items(&backups)
            .default(0)
            .interact()?;
        return Ok(Some(backups[selection].clone()));
    }

    Ok(manager
        .find_latest_backup(target, &target.backup.local_path)?
        .map(|p| p.display().to_string()))
}

fn print_targets(manager: &BackupManager, config: &Config, show_backups: bool) -> Result<()> {
    if config.targets.is_empty() {
        println!("No backup targets configured.");
        return Ok(());
    }

    println!("Backup targets:");
    for target in &config.targets {
        println!("- ID: {}", target.id);
        println!(
            "  Database: {} ({})",
            target.database.db_type,
            target.database.artifact_name()
        );
        println!("  Backup Path: {}", target.backup.local_path.display());
        println!("  Schedule: {}", target.backup.schedule);
        println!("  Cloud: {}", target.backup.cloud.cloud_type);

        if show_backups {
            let backups = manager.list_backups(target)?;
            if backups.is_empty() {
                println!("  No backups found.");
            } else {
                println!("  Backups:");
                for backup in backups {
                    println!("    - {}", backup.display());
                }
            }
        }
        println!();
    }
    Ok(())
}

fn ask(prompt: &str, default: Option<&str>) -> Result<String> {
    let mut input = Input::<String>::new().with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default.to_string());
    }
    Ok(input.interact_text()?)
}

fn ask_optional(prompt: &str) -> Result<String> {
    Ok(Input::<String>::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?)
}

fn ask_secret(prompt: &str, allow_empty: bool) -> Result<String> {
    Ok(Password::new()
        .with_prompt(prompt)
        .allow_empty_password(allow_empty)
        .interact()?)
}

fn given_or<T>(value: Option<T>, prompt: impl FnOnce() -> Result<T>) -> Result<T> {
    match value {
        Some(value) => Ok(value),
        None => prompt(),
    }
}

fn handle_init(config_path: &Path, args: InitArgs) -> Result<()> {
    let mut config = match config::load_config(config_path) {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) => Config::default(),
        Err(e) => return Err(e.into()),
    };

    let db_type = match args.db_type.filter(|_| !args.interactive) {
        Some(db_type) => db_type,
        None => ask("Database type (postgresql/mysql/mongodb/sqlite)", None)?
            .parse::<DatabaseType>()
            .map_err(anyhow::Error::msg)?,
    };

    let mut database = DatabaseConfig {
        db_type,
        name: String::new(),
        host: String::new(),
        port: 0,
        user: None,
        password: None,
        path: None,
        auth_source: None,
    };

    if db_type == DatabaseType::Sqlite {
        let path = PathBuf::from(given_or(args.db_name, || ask("SQLite file path", None))?);
        database.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        database.path = Some(path);
    } else {
        database.name = given_or(args.db_name, || ask("Database name", None))?;
        database.host = given_or(args.db_host, || ask("Database host", Some("localhost")))?;
        database.port = given_or(args.db_port, || {
            let default = db_type.default_port().to_string();
            Ok(ask("Database port", Some(&default))?.parse()?)
        })?;

        if db_type == DatabaseType::Mongodb {
            database.user = Some(given_or(args.db_user, || ask_optional("Database user"))?);
            database.password =
                Some(given_or(args.db_password, || ask_secret("Database password", true))?);
        } else {
            database.user = Some(given_or(args.db_user, || ask("Database user", None))?);
            database.password =
                Some(given_or(args.db_password, || ask_secret("Database password", true))?);
        }
    }

    let local_path = given_or(args.backup_path, || {
        Ok(PathBuf::from(ask("Local backup path", None)?))
    })?;
    let schedule = given_or(args.schedule, || {
        ask("Schedule (hourly/daily/weekly)", Some("daily"))?
            .parse::<Schedule>()
            .map_err(anyhow::Error::msg)
    })?;
    let cloud_type = given_or(args.cloud, || {
        ask("Cloud storage (none/s3)", Some("none"))?
            .parse::<CloudType>()
            .map_err(anyhow::Error::msg)
    })?;

    let mut s3 = S3Config::default();
    if cloud_type == CloudType::S3 {
        s3.bucket = given_or(args.s3_bucket, || ask("S3 bucket name", None))?;
        s3.access_key = given_or(args.s3_access_key, || ask("S3 access key", None))?;
        s3.secret_key = given_or(args.s3_secret_key, || ask_secret("S3 secret key", false))?;
        s3.region = args.s3_region;
        s3.endpoint = args.s3_endpoint;
    }

    let default_id = sanitize_id(&database.name);
    let id = sanitize_id(&given_or(args.id, || ask("Target ID", Some(&default_id)))?);

    let target = Target {
        id,
        database,
        backup: BackupConfig {
            local_path: config::expand_tilde(&local_path),
            schedule,
            cloud: CloudConfig { cloud_type, s3 },
        },
    };

    let id = target.id.clone();
    config.add_target(target)?;
    config::save_config(config_path, &config)?;
    info!("Target '{}' initialized.", id);
    Ok(())
}
