//! Configuration for slurmsync
//!
//! Settings are read from TOML files, lowest priority first:
//!
//! 1. `/etc/slurmsync/config.toml`
//! 2. `slurmsync.toml` in the working directory
//! 3. a file passed with `--config`
//!
//! Later files override earlier ones key by key; anything left unset keeps its
//! default.

mod accounts;
mod licenses;

pub use accounts::{AccountSyncConfig, InstituteConfig};
pub use licenses::LicenseSyncConfig;

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Standard configuration file locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub system: PathBuf,
    pub local: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigPaths {
    pub fn new() -> Self {
        Self {
            system: PathBuf::from("/etc/slurmsync/config.toml"),
            local: PathBuf::from("slurmsync.toml"),
        }
    }

    /// The paths that exist, lowest priority first
    pub fn existing_paths(&self) -> Vec<&PathBuf> {
        [&self.system, &self.local]
            .into_iter()
            .filter(|path| path.is_file())
            .collect()
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,

    /// Clusters whose accounts, users and QOS are managed
    pub clusters: Vec<String>,

    /// Refuse to cancel jobs of more users and accounts than this in one run
    pub max_cancel_targets: usize,

    pub accounts: AccountSyncConfig,

    pub licenses: LicenseSyncConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            clusters: Vec::new(),
            max_cancel_targets: 20,
            accounts: AccountSyncConfig::default(),
            licenses: LicenseSyncConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load from the standard locations plus an optional explicit file
    pub fn load(explicit: Option<&Path>) -> Result<Self, SyncError> {
        let paths = ConfigPaths::new();
        let mut files: Vec<PathBuf> = paths.existing_paths().into_iter().cloned().collect();
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(SyncError::Config(format!(
                    "configuration file {} does not exist",
                    path.display()
                )));
            }
            files.push(path.to_path_buf());
        }
        Self::load_from_files(&files)
    }

    pub fn load_with_paths(paths: &ConfigPaths) -> Result<Self, SyncError> {
        let files: Vec<PathBuf> = paths.existing_paths().into_iter().cloned().collect();
        Self::load_from_files(&files)
    }

    /// Merge the given files in order; later files win
    pub fn load_from_files(files: &[PathBuf]) -> Result<Self, SyncError> {
        let mut merged = toml::Table::new();
        for file in files {
            debug!("Loading configuration from {}", file.display());
            let content = fs::read_to_string(file)?;
            let table: toml::Table = content.parse()?;
            merge_tables(&mut merged, table);
        }
        Ok(toml::Value::Table(merged).try_into()?)
    }

    /// Check the configuration, returning every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "log_level '{}' must be one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            ));
        }
        if self.max_cancel_targets == 0 {
            errors.push("max_cancel_targets must be greater than 0".to_string());
        }
        if self.clusters.iter().any(String::is_empty) {
            errors.push("clusters must not contain empty names".to_string());
        }
        self.accounts.validate(&mut errors);
        self.licenses.validate(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The clusters to manage, or a configuration error when none are set
    pub fn require_clusters(&self) -> Result<&[String], SyncError> {
        if self.clusters.is_empty() {
            return Err(SyncError::Config("no clusters configured".to_string()));
        }
        Ok(&self.clusters)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn generate_default_config() -> String {
        Self::default().to_toml().unwrap_or_default()
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(table)) => {
                merge_tables(existing, table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
