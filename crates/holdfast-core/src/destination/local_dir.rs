use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::destination::{Destination, DirEntry};
use crate::error::{HoldfastError, Result};

/// Destination adapter for a local filesystem directory.
pub struct LocalDirDestination {
    root: PathBuf,
}

impl LocalDirDestination {
    /// Create a destination rooted at the given directory path.
    pub fn new(root: &str) -> Result<Self> {
        let root_path = PathBuf::from(root);
        // Canonicalize if the path already exists for clearer errors with
        // symlinked roots.
        let root = if root_path.exists() {
            fs::canonicalize(&root_path)?
        } else {
            root_path
        };
        Ok(Self { root })
    }

    /// Reject keys that could escape the destination root. The empty key
    /// denotes the root itself.
    fn validate_key(key: &str) -> Result<()> {
        if key.starts_with('/') {
            return Err(HoldfastError::InvalidFormat(format!(
                "unsafe destination key: absolute path '{key}'"
            )));
        }
        if key.contains('\\') {
            return Err(HoldfastError::InvalidFormat(format!(
                "unsafe destination key: contains backslash '{key}'"
            )));
        }
        for component in Path::new(key).components() {
            if component == Component::ParentDir {
                return Err(HoldfastError::InvalidFormat(format!(
                    "unsafe destination key: parent traversal '{key}'"
                )));
            }
        }
        Ok(())
    }

    /// Resolve a `/`-separated key to a filesystem path under the root.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        Self::validate_key(key)?;
        if key.is_empty() {
            return Ok(self.root.clone());
        }
        Ok(self.root.join(key))
    }
}

impl Destination for LocalDirDestination {
    fn read_dir(&self, rel_path: &str) -> Result<Vec<DirEntry>> {
        let dir = self.resolve(rel_path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        Ok(entries)
    }

    fn file_exists(&self, rel_path: &str) -> Result<bool> {
        let path = self.resolve(rel_path)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Err(HoldfastError::Other(format!(
                "expected file, but '{rel_path}' is a directory"
            ))),
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read_file(&self, rel_path: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(rel_path)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_file(&self, rel_path: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(rel_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        Ok(())
    }

    fn create_dir(&self, rel_path: &str) -> Result<()> {
        let path = self.resolve(rel_path.trim_end_matches('/'))?;
        fs::create_dir_all(&path)?;
        Ok(())
    }

    fn delete_dir(&self, rel_path: &str) -> Result<()> {
        let path = self.resolve(rel_path)?;
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_destination() -> (LocalDirDestination, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let dest = LocalDirDestination::new(dir.path().to_str().unwrap()).unwrap();
        (dest, dir)
    }

    #[test]
    fn validate_key_rejects_unsafe_keys() {
        assert!(LocalDirDestination::validate_key("/etc/passwd").is_err());
        assert!(LocalDirDestination::validate_key("../../outside").is_err());
        assert!(LocalDirDestination::validate_key("foo/../../etc/passwd").is_err());
        assert!(LocalDirDestination::validate_key("foo\\bar").is_err());
    }

    #[test]
    fn validate_key_accepts_safe_keys() {
        assert!(LocalDirDestination::validate_key("").is_ok());
        assert!(LocalDirDestination::validate_key(".blob-index").is_ok());
        assert!(LocalDirDestination::validate_key(".blobs/aa/bb/cc/dd/deadbeef").is_ok());
        assert!(LocalDirDestination::validate_key("20250101T120000Z/.snapshot").is_ok());
    }

    #[test]
    fn read_file_returns_none_for_missing() {
        let (dest, _dir) = temp_destination();
        assert!(dest.read_file("no_such_file").unwrap().is_none());
    }

    #[test]
    fn write_file_creates_parents() {
        let (dest, _dir) = temp_destination();
        dest.write_file("a/b/c/file", b"payload").unwrap();
        assert_eq!(dest.read_file("a/b/c/file").unwrap().unwrap(), b"payload");
    }

    #[test]
    fn file_exists_errors_on_directory() {
        let (dest, _dir) = temp_destination();
        dest.create_dir("somedir").unwrap();
        assert!(dest.file_exists("somedir").is_err());
        assert!(!dest.file_exists("missing").unwrap());
        dest.write_file("present", b"x").unwrap();
        assert!(dest.file_exists("present").unwrap());
    }

    #[test]
    fn read_dir_lists_entries_with_kind() {
        let (dest, _dir) = temp_destination();
        dest.create_dir("sub").unwrap();
        dest.write_file("file", b"x").unwrap();
        let mut entries = dest.read_dir("").unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "file");
        assert!(!entries[0].is_dir);
        assert_eq!(entries[1].name, "sub");
        assert!(entries[1].is_dir);
    }

    #[test]
    fn delete_dir_removes_tree_and_tolerates_missing() {
        let (dest, _dir) = temp_destination();
        dest.write_file("tree/a", b"1").unwrap();
        dest.write_file("tree/b/c", b"2").unwrap();
        dest.delete_dir("tree").unwrap();
        assert!(dest.read_file("tree/a").unwrap().is_none());
        dest.delete_dir("tree").unwrap();
    }

    #[test]
    fn resolve_rejects_traversal() {
        let (dest, _dir) = temp_destination();
        assert!(dest.read_file("../../etc/passwd").is_err());
        assert!(dest.write_file("../escape", b"bad").is_err());
    }
}
