use std::path::Path;

use crate::config::BackupSetConfig;
use crate::destination::{self, Destination};
use crate::error::{HoldfastError, Result};
use crate::snapshot::catalog;
use crate::snapshot::Snapshot;

/// A validated backup set: one source tree bound to one destination.
#[derive(Debug)]
pub struct BackupSet {
    conf: BackupSetConfig,
}

impl BackupSet {
    /// Validate a configuration entry and wrap it.
    pub fn from_config(conf: BackupSetConfig) -> Result<Self> {
        if !Path::new(&conf.source.path).is_absolute() {
            return Err(HoldfastError::Config(format!(
                "backup set '{}': source path must be absolute",
                conf.name
            )));
        }
        if conf.destinations.is_empty() {
            return Err(HoldfastError::Config(format!(
                "backup set '{}': missing destination",
                conf.name
            )));
        }
        if conf.destinations.len() > 1 {
            return Err(HoldfastError::Config(format!(
                "backup set '{}': multiple destinations not yet supported",
                conf.name
            )));
        }
        if conf.encryption.enabled {
            return Err(HoldfastError::Config(format!(
                "backup set '{}': blob encryption is not supported yet",
                conf.name
            )));
        }
        Ok(Self { conf })
    }

    pub fn name(&self) -> &str {
        &self.conf.name
    }

    pub fn config(&self) -> &BackupSetConfig {
        &self.conf
    }

    /// Open the set's destination.
    pub fn open_destination(&self) -> Result<Box<dyn Destination>> {
        destination::from_config(&self.conf.destinations[0])
    }

    /// All finalized snapshots at the destination.
    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let dest = self.open_destination()?;
        catalog::list_snapshots(dest.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DestinationConfig, EncryptionConfig, SourceConfig};

    fn base_config() -> BackupSetConfig {
        BackupSetConfig {
            name: "docs".into(),
            source: SourceConfig {
                path: "/home/user/docs".into(),
                exclude: Vec::new(),
            },
            destinations: vec![DestinationConfig::LocalDir {
                path: "/mnt/backup".into(),
            }],
            encryption: EncryptionConfig::default(),
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert!(BackupSet::from_config(base_config()).is_ok());
    }

    #[test]
    fn rejects_relative_source() {
        let mut conf = base_config();
        conf.source.path = "relative/docs".into();
        let err = BackupSet::from_config(conf).unwrap_err();
        assert!(err.to_string().contains("must be absolute"));
    }

    #[test]
    fn rejects_missing_destination() {
        let mut conf = base_config();
        conf.destinations.clear();
        let err = BackupSet::from_config(conf).unwrap_err();
        assert!(err.to_string().contains("missing destination"));
    }

    #[test]
    fn rejects_multiple_destinations() {
        let mut conf = base_config();
        conf.destinations.push(DestinationConfig::LocalDir {
            path: "/mnt/backup2".into(),
        });
        let err = BackupSet::from_config(conf).unwrap_err();
        assert!(err.to_string().contains("multiple destinations"));
    }

    #[test]
    fn rejects_enabled_encryption() {
        let mut conf = base_config();
        conf.encryption.enabled = true;
        let err = BackupSet::from_config(conf).unwrap_err();
        assert!(err.to_string().contains("encryption"));
    }
}
