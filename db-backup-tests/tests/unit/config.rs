//! Unit tests for configuration loading, migration and validation

use db_backup::config::{
    expand_tilde, load_config, sanitize_id, save_config, select_targets, validate_target,
    CloudType, ConfigError, DatabaseType, Schedule,
};
use rstest::rstest;
use serial_test::serial;
use std::path::{Path, PathBuf};
use test_utils::{fixtures, ConfigBuilder, ResultAssertions, TargetBuilder, TestContext};

fn render_fixture(ctx: &TestContext, template: &str) -> String {
    let log_dir = ctx.temp_dir().join("logs");
    let db_path = ctx.temp_dir().join("app.db");
    let backup_path = ctx.temp_dir().join("backups");

    fixtures::render(
        template,
        &[
            ("log_dir", log_dir.as_path()),
            ("db_path", db_path.as_path()),
            ("backup_path", backup_path.as_path()),
        ],
    )
}

#[test]
fn test_load_multi_target_json() {
    let ctx = TestContext::new();
    let path = ctx.create_file(
        "config.json",
        &render_fixture(&ctx, fixtures::multi_target_config_json()),
    );

    let config = load_config(&path).assert_ok();

    assert_eq!(config.targets.len(), 2);
    assert_eq!(config.global.log_level, "debug");
    // Unset global values fall back to defaults
    assert_eq!(config.global.log_max_files, 10);

    let app = config.find_target("app").assert_ok();
    assert_eq!(app.database.db_type, DatabaseType::Sqlite);
    assert_eq!(app.backup.schedule, Schedule::Hourly);
    assert_eq!(app.database.artifact_name(), "app");

    let shop = config.find_target("shop").assert_ok();
    assert_eq!(shop.backup.cloud.cloud_type, CloudType::Local);
    assert_eq!(shop.database.password.as_deref(), Some(""));
    assert!(validate_target(shop).is_ok());
}

#[test]
fn test_load_toml() {
    let ctx = TestContext::new();
    let path = ctx.create_file(
        "config.toml",
        &render_fixture(&ctx, fixtures::multi_target_config_toml()),
    );

    let config = load_config(&path).assert_ok();
    assert_eq!(config.targets.len(), 1);
    assert_eq!(config.targets[0].id, "app");
    assert_eq!(config.targets[0].backup.schedule, Schedule::Hourly);
}

#[test]
fn test_toml_save_and_reload() {
    let ctx = TestContext::new();
    let config = ConfigBuilder::new()
        .add_sqlite_target("app", &ctx.temp_dir().join("app.db"))
        .add_target(TargetBuilder::new("pg", DatabaseType::Postgresql).s3("bucket").build())
        .build();

    let path = ctx.temp_dir().join("nested").join("config.toml");
    save_config(&path, &config).assert_ok();

    let loaded = load_config(&path).assert_ok();
    assert_eq!(loaded.targets, config.targets);
}

#[test]
fn test_json_is_saved_with_four_space_indent() {
    let ctx = TestContext::new();
    let config = ConfigBuilder::new()
        .add_sqlite_target("app", &ctx.temp_dir().join("app.db"))
        .build();

    ctx.write_config(&config);
    let written = ctx.read_file("config.json").unwrap();
    assert!(written.contains("\n    \"targets\""));
}

#[test]
fn test_legacy_config_is_migrated_and_saved() {
    let ctx = TestContext::new();
    let path = ctx.create_file(
        "config.json",
        &render_fixture(&ctx, fixtures::legacy_config_json()),
    );

    let config = load_config(&path).assert_ok();
    assert_eq!(config.targets.len(), 1);

    let target = &config.targets[0];
    assert_eq!(target.id, "Legacy Shop");
    assert_eq!(target.database.db_type, DatabaseType::Mysql);
    assert_eq!(target.backup.schedule, Schedule::Weekly);

    // Second load reads the migrated layout directly
    let reloaded = load_config(&path).assert_ok();
    assert_eq!(reloaded.targets, config.targets);
    assert!(ctx.read_file("config.json").unwrap().contains("\"targets\""));
}

#[test]
fn test_missing_config_points_to_init() {
    let ctx = TestContext::new();
    let err = load_config(ctx.temp_dir().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
    assert!(err.to_string().contains("init"));
}

#[test]
fn test_malformed_config_is_parse_error() {
    let ctx = TestContext::new();
    let path = ctx.create_file("config.json", "{ not json");
    assert!(matches!(
        load_config(&path).unwrap_err(),
        ConfigError::ParseError(_)
    ));
}

#[rstest]
#[case(DatabaseType::Postgresql, "user", "postgresql requires 'user'")]
#[case(DatabaseType::Postgresql, "password", "postgresql requires 'password'")]
#[case(DatabaseType::Mysql, "host", "mysql requires 'host'")]
#[case(DatabaseType::Mysql, "port", "mysql requires 'port'")]
#[case(DatabaseType::Mongodb, "name", "mongodb requires 'name'")]
fn test_validation_names_missing_field(
    #[case] db_type: DatabaseType,
    #[case] field: &str,
    #[case] message: &str,
) {
    let mut target = TargetBuilder::new("t", db_type).build();
    match field {
        "user" => target.database.user = None,
        "password" => target.database.password = None,
        "host" => target.database.host.clear(),
        "port" => target.database.port = 0,
        "name" => target.database.name.clear(),
        other => panic!("unexpected field {}", other),
    }

    validate_target(&target).assert_err_contains(message);
}

#[test]
fn test_mongodb_credentials_are_optional() {
    let target = TargetBuilder::new("m", DatabaseType::Mongodb)
        .without_credentials()
        .build();
    assert!(validate_target(&target).is_ok());
}

#[test]
fn test_backup_and_s3_requirements() {
    let target = TargetBuilder::sqlite("s", Path::new("/tmp/s.db"))
        .backup_path(Path::new(""))
        .build();
    validate_target(&target).assert_err_contains("Backup requires 'local_path'");

    let mut target = TargetBuilder::sqlite("s", Path::new("/tmp/s.db"))
        .backup_path(Path::new("/tmp/b"))
        .s3("bucket")
        .build();
    target.backup.cloud.s3.secret_key.clear();
    validate_target(&target).assert_err_contains("S3 requires 'secret_key'");
}

#[rstest]
#[case("Production DB", "production_db")]
#[case("orders-2024", "orders-2024")]
#[case("  spaced  ", "spaced")]
#[case("", "default")]
#[case("___", "default")]
fn test_sanitize_id(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(sanitize_id(input), expected);
}

#[test]
fn test_select_targets() {
    let config = ConfigBuilder::new()
        .add_sqlite_target("a", Path::new("/tmp/a.db"))
        .add_sqlite_target("b", Path::new("/tmp/b.db"))
        .build();

    assert_eq!(select_targets(&config.targets, None).assert_ok().len(), 2);

    let only_b = config.select_targets(Some("b")).assert_ok();
    assert_eq!(only_b.len(), 1);
    assert_eq!(only_b[0].id, "b");

    assert!(matches!(
        config.select_targets(Some("zzz")).unwrap_err(),
        ConfigError::TargetNotFound(_)
    ));
    assert!(select_targets(&[], None).is_err());
}

#[test]
#[serial]
fn test_expand_tilde_uses_home() {
    let ctx = TestContext::new();
    let previous = std::env::var_os("HOME");
    std::env::set_var("HOME", ctx.temp_dir());

    let expanded = expand_tilde(Path::new("~/backups/db"));

    match previous {
        Some(home) => std::env::set_var("HOME", home),
        None => std::env::remove_var("HOME"),
    }

    assert_eq!(expanded, ctx.temp_dir().join("backups/db"));
    assert_eq!(expand_tilde(Path::new("/abs/path")), PathBuf::from("/abs/path"));
}
