use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::destination::{Destination, DirEntry};
use crate::error::{HoldfastError, Result};

/// In-memory destination for tests. Thread-safe via Mutex.
///
/// The directory structure is derived from `/`-separated keys; explicitly
/// created (possibly empty) directories are tracked so `read_dir` reports
/// them like the local adapter does.
pub struct MemoryDestination {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    dirs: Mutex<BTreeSet<String>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            dirs: Mutex::new(BTreeSet::new()),
        }
    }
}

impl Destination for MemoryDestination {
    fn read_dir(&self, rel_path: &str) -> Result<Vec<DirEntry>> {
        let prefix = if rel_path.is_empty() {
            String::new()
        } else {
            format!("{rel_path}/")
        };
        let files = self.files.lock().unwrap();
        let dirs = self.dirs.lock().unwrap();

        let mut names: BTreeMap<String, bool> = BTreeMap::new();
        for key in files.keys() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                match rest.split_once('/') {
                    Some((dir, _)) => {
                        names.insert(dir.to_string(), true);
                    }
                    None if !rest.is_empty() => {
                        names.entry(rest.to_string()).or_insert(false);
                    }
                    None => {}
                }
            }
        }
        for key in dirs.iter() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if rest.is_empty() {
                    continue;
                }
                let first = rest.split('/').next().unwrap_or(rest);
                names.insert(first.to_string(), true);
            }
        }

        Ok(names
            .into_iter()
            .map(|(name, is_dir)| DirEntry { name, is_dir })
            .collect())
    }

    fn file_exists(&self, rel_path: &str) -> Result<bool> {
        let files = self.files.lock().unwrap();
        if files.contains_key(rel_path) {
            return Ok(true);
        }
        let prefix = format!("{rel_path}/");
        if files.keys().any(|k| k.starts_with(&prefix))
            || self.dirs.lock().unwrap().contains(rel_path)
        {
            return Err(HoldfastError::Other(format!(
                "expected file, but '{rel_path}' is a directory"
            )));
        }
        Ok(false)
    }

    fn read_file(&self, rel_path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.files.lock().unwrap().get(rel_path).cloned())
    }

    fn write_file(&self, rel_path: &str, data: &[u8]) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(rel_path.to_string(), data.to_vec());
        Ok(())
    }

    fn create_dir(&self, rel_path: &str) -> Result<()> {
        self.dirs
            .lock()
            .unwrap()
            .insert(rel_path.trim_end_matches('/').to_string());
        Ok(())
    }

    fn delete_dir(&self, rel_path: &str) -> Result<()> {
        let prefix = format!("{rel_path}/");
        self.files
            .lock()
            .unwrap()
            .retain(|k, _| k != rel_path && !k.starts_with(&prefix));
        self.dirs
            .lock()
            .unwrap()
            .retain(|k| k != rel_path && !k.starts_with(&prefix));
        Ok(())
    }
}
