pub mod local_dir;

use std::sync::Arc;

use crate::config::DestinationConfig;
use crate::error::Result;

/// A single entry returned by [`Destination::read_dir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Abstract byte-addressable directory backing blob and manifest storage.
///
/// Paths are `/`-separated keys relative to the destination root; the empty
/// key denotes the root itself. Adapters translate to native separators.
pub trait Destination: Send + Sync {
    /// List the entries of a directory, without `.` and `..`.
    fn read_dir(&self, rel_path: &str) -> Result<Vec<DirEntry>>;

    /// Check whether a file exists. Errors if the path is a directory.
    fn file_exists(&self, rel_path: &str) -> Result<bool>;

    /// Read a file's bytes. Returns `None` when the file does not exist.
    fn read_file(&self, rel_path: &str) -> Result<Option<Vec<u8>>>;

    /// Write a file, creating missing parent directories.
    fn write_file(&self, rel_path: &str, data: &[u8]) -> Result<()>;

    fn create_dir(&self, rel_path: &str) -> Result<()>;

    fn delete_dir(&self, rel_path: &str) -> Result<()>;
}

impl<T: Destination + ?Sized> Destination for Arc<T> {
    fn read_dir(&self, rel_path: &str) -> Result<Vec<DirEntry>> {
        (**self).read_dir(rel_path)
    }
    fn file_exists(&self, rel_path: &str) -> Result<bool> {
        (**self).file_exists(rel_path)
    }
    fn read_file(&self, rel_path: &str) -> Result<Option<Vec<u8>>> {
        (**self).read_file(rel_path)
    }
    fn write_file(&self, rel_path: &str, data: &[u8]) -> Result<()> {
        (**self).write_file(rel_path, data)
    }
    fn create_dir(&self, rel_path: &str) -> Result<()> {
        (**self).create_dir(rel_path)
    }
    fn delete_dir(&self, rel_path: &str) -> Result<()> {
        (**self).delete_dir(rel_path)
    }
}

/// Build a destination from its configuration.
pub fn from_config(config: &DestinationConfig) -> Result<Box<dyn Destination>> {
    match config {
        DestinationConfig::LocalDir { path } => {
            Ok(Box::new(local_dir::LocalDirDestination::new(path)?))
        }
    }
}
