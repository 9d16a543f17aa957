//! YAML configuration: backup set descriptors and config file resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HoldfastError, Result};

/// Top-level configuration document: the list of configured backup sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub backup_sets: Vec<BackupSetConfig>,
}

/// One named backup set binding a source tree to its destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupSetConfig {
    pub name: String,
    pub source: SourceConfig,
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub encryption: EncryptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Absolute path of the directory to capture.
    pub path: String,
    /// Gitignore-style patterns excluded from every snapshot.
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum DestinationConfig {
    LocalDir { path: String },
}

/// Blob encryption descriptor. Carried in the config model as an extension
/// point; enabling it is rejected until a cipher scheme is implemented.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Hex-encoded salted SHA-256 of the passphrase.
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub password_salt: Option<String>,
}

impl Config {
    /// Load and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            HoldfastError::Config(format!(
                "cannot read config file '{}': {e}",
                path.display()
            ))
        })?;
        let config: Config = serde_yaml::from_str(&text)?;
        Ok(config)
    }

    /// Find a backup set by name.
    pub fn find_set(&self, name: &str) -> Option<&BackupSetConfig> {
        self.backup_sets.iter().find(|s| s.name == name)
    }
}

/// Resolve the configuration file path: explicit flag, then the
/// `HOLDFAST_CONFIG` environment variable, then the default search paths.
pub fn resolve_config_path(flag: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = flag {
        return Some(PathBuf::from(path));
    }
    if let Ok(path) = std::env::var("HOLDFAST_CONFIG") {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_search_paths().into_iter().find(|p| p.exists())
}

/// Search order for the configuration file when no explicit path is given.
pub fn default_config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("holdfast.yaml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("holdfast").join("config.yaml"));
    }
    paths.push(PathBuf::from("/etc/holdfast/config.yaml"));
    paths
}

/// Starter configuration written by `holdfast config`.
pub fn minimal_config_template() -> &'static str {
    r#"backup_sets:
  - name: documents
    source:
      path: /home/user/Documents
      exclude:
        - "*.tmp"
        - ".cache/"
    destinations:
      - type: local_dir
        path: /mnt/backup/documents
"#
}
