use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::backup_set::BackupSet;
use crate::config::{BackupSetConfig, DestinationConfig, EncryptionConfig, SourceConfig};

/// Backup set rooted in fresh temp source and destination directories.
pub(crate) fn temp_backup_set() -> (BackupSet, TempDir, TempDir) {
    temp_backup_set_with_excludes(Vec::new())
}

pub(crate) fn temp_backup_set_with_excludes(
    exclude: Vec<String>,
) -> (BackupSet, TempDir, TempDir) {
    let source = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let set = BackupSet::from_config(BackupSetConfig {
        name: "test".into(),
        source: SourceConfig {
            path: source.path().to_string_lossy().into_owned(),
            exclude,
        },
        destinations: vec![DestinationConfig::LocalDir {
            path: dest.path().to_string_lossy().into_owned(),
        }],
        encryption: EncryptionConfig::default(),
    })
    .unwrap();
    (set, source, dest)
}

pub(crate) fn write_source_file(dir: &Path, rel: &str, contents: &[u8]) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Parse a snapshot directory name into its timestamp.
pub(crate) fn ts(name: &str) -> DateTime<Utc> {
    crate::snapshot::parse_timestamp(name).unwrap()
}
