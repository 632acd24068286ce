//! Tests for the configuration module

use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use slurmsync::config::{ConfigPaths, InstituteConfig, SyncConfig};
use slurmsync::errors::SyncError;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

// ============== Loading ==============

#[rstest]
fn test_load_returns_defaults_when_no_files() {
    let temp_dir = TempDir::new().unwrap();
    let paths = ConfigPaths {
        system: temp_dir.path().join("missing-system.toml"),
        local: temp_dir.path().join("missing-local.toml"),
    };
    assert!(paths.existing_paths().is_empty());

    let config = SyncConfig::load_with_paths(&paths).unwrap();
    assert_eq!(config.log_level, "info");
    assert_eq!(config.max_cancel_targets, 20);
    assert_eq!(config.licenses.default_tool, "/usr/bin/lmutil");
}

#[rstest]
fn test_load_partial_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(
        &temp_dir,
        "config.toml",
        r#"
clusters = ["cluster1", "cluster2"]

[accounts]
project_default_account = "gpr_default"
protected_accounts = ["some_project"]
"#,
    );

    let config = SyncConfig::load_from_files(&[path]).unwrap();
    assert_eq!(config.clusters, vec!["cluster1", "cluster2"]);
    assert_eq!(
        config.accounts.project_default_account.as_deref(),
        Some("gpr_default")
    );
    // Unset keys in a partial section keep their defaults
    assert_eq!(config.accounts.project_parent, "projects");
    assert_eq!(config.accounts.organisations["gent"], "ugent");
    assert_eq!(config.accounts.institutes.len(), 4);
}

#[rstest]
fn test_later_files_override_earlier_ones() {
    let temp_dir = TempDir::new().unwrap();
    let system = write(
        &temp_dir,
        "system.toml",
        r#"
log_level = "warn"
clusters = ["cluster1"]
max_cancel_targets = 50

[licenses]
resource_clusters = ["cluster1", "cluster2"]
reservation_cluster = "cluster1"
reservation_partition = "licenses"
"#,
    );
    let local = write(
        &temp_dir,
        "local.toml",
        r#"
clusters = ["cluster2"]

[licenses]
reservation_cluster = "cluster2"
"#,
    );

    let paths = ConfigPaths { system, local };
    assert_eq!(paths.existing_paths().len(), 2);
    let config = SyncConfig::load_with_paths(&paths).unwrap();

    assert_eq!(config.log_level, "warn");
    assert_eq!(config.max_cancel_targets, 50);
    assert_eq!(config.clusters, vec!["cluster2"]);
    assert_eq!(config.licenses.reservation_cluster, "cluster2");
    assert_eq!(config.licenses.reservation_partition, "licenses");
    assert_eq!(config.licenses.resource_clusters, vec!["cluster1", "cluster2"]);
    assert!(config.validate().is_ok());
}

#[rstest]
fn test_institutes_from_toml() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(
        &temp_dir,
        "config.toml",
        r#"
[accounts.organisations]
gent = "ugent"

[[accounts.institutes]]
name = "gent"
default_vo = "gvo00012"
fairshare = 100
"#,
    );

    let config = SyncConfig::load_from_files(&[path]).unwrap();
    assert_eq!(
        config.accounts.institutes,
        vec![InstituteConfig::new("gent", "gvo00012", 100)]
    );
    // A table given in a file replaces the default table
    assert_eq!(config.accounts.organisations.len(), 1);
    assert_eq!(config.accounts.default_vos(), vec!["gvo00012"]);
    assert!(config.validate().is_ok());
}

#[rstest]
fn test_explicit_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");
    let err = SyncConfig::load(Some(missing.as_path())).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
    assert!(err.to_string().contains("nope.toml"));
}

#[rstest]
#[case("clusters = [\"unterminated\"\n")]
#[case("max_cancel_targets = \"many\"\n")]
fn test_invalid_toml(#[case] content: &str) {
    let temp_dir = TempDir::new().unwrap();
    let path = write(&temp_dir, "bad.toml", content);
    let err = SyncConfig::load_from_files(&[path]).unwrap_err();
    assert!(matches!(err, SyncError::Toml(_)));
}

#[rstest]
fn test_empty_toml_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(&temp_dir, "empty.toml", "");
    let config = SyncConfig::load_from_files(&[path]).unwrap();
    assert_eq!(config.log_level, "info");
    assert!(config.clusters.is_empty());
}

// ============== Validation ==============

#[rstest]
fn test_validate_default_config() {
    assert!(SyncConfig::default().validate().is_ok());
}

#[rstest]
#[case("verbose")]
#[case("")]
fn test_validate_invalid_log_level(#[case] level: &str) {
    let mut config = SyncConfig::default();
    config.log_level = level.to_string();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("log_level"));
}

#[rstest]
fn test_validate_log_level_case_insensitive() {
    let mut config = SyncConfig::default();
    config.log_level = "DEBUG".to_string();
    assert!(config.validate().is_ok());
}

#[rstest]
fn test_validate_reservation_cluster_not_managed() {
    let mut config = SyncConfig::default();
    config.licenses.resource_clusters = vec!["cluster1".to_string()];
    config.licenses.reservation_cluster = "cluster2".to_string();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("licenses.reservation_cluster"));
}

#[rstest]
fn test_validate_institute_without_organisation() {
    let mut config = SyncConfig::default();
    config.accounts.organisations.remove("leuven");
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("'leuven'"));
}

#[rstest]
fn test_validate_multiple_errors() {
    let mut config = SyncConfig::default();
    config.log_level = "loud".to_string();
    config.max_cancel_targets = 0;
    config.clusters = vec![String::new()];
    config
        .accounts
        .institutes
        .push(InstituteConfig::new("gent", "gvo99999", 1));
    config.accounts.host_institute = "nowhere".to_string();

    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 5);
}

// ============== Serialization ==============

#[rstest]
fn test_generate_default_config() {
    let generated = SyncConfig::generate_default_config();
    assert!(generated.contains("log_level = \"info\""));
    assert!(generated.contains("max_cancel_targets = 20"));
    assert!(generated.contains("default_tool = \"/usr/bin/lmutil\""));
}

#[rstest]
fn test_roundtrip_serialization() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = SyncConfig::default();
    config.clusters = vec!["cluster1".to_string()];
    config.accounts.project_default_account = Some("gpr_default".to_string());
    config.accounts.qos_cleanup = true;

    let path = write(&temp_dir, "config.toml", &config.to_toml().unwrap());
    let loaded = SyncConfig::load_from_files(&[path]).unwrap();

    assert_eq!(loaded.clusters, config.clusters);
    assert_eq!(loaded.accounts.project_default_account, config.accounts.project_default_account);
    assert!(loaded.accounts.qos_cleanup);
    assert_eq!(loaded.accounts.institutes, config.accounts.institutes);
    assert_eq!(loaded.accounts.organisations, config.accounts.organisations);
}
