//! Read-only tree view over one snapshot, backed by a prefix tree over its
//! file paths for constant-per-level directory queries.

pub mod reader;

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::backup_set::BackupSet;
use crate::blob::{self, BlobId};
use crate::destination::Destination;
use crate::error::{HoldfastError, Result};
use crate::index::BlobIndex;
use crate::snapshot::{FileSnapshot, Snapshot};

pub use reader::SnapshotFileReader;

pub struct Browser {
    dest: Box<dyn Destination>,
    snapshot: Snapshot,
    blob_index: BlobIndex,
    tree: PrefixTree,
}

impl Browser {
    /// Bind a backup set and a snapshot, loading the blob index eagerly.
    pub fn new(set: &BackupSet, snapshot: Snapshot) -> Result<Self> {
        Self::from_destination(set.open_destination()?, snapshot)
    }

    pub(crate) fn from_destination(dest: Box<dyn Destination>, snapshot: Snapshot) -> Result<Self> {
        let blob_index = BlobIndex::load(dest.as_ref())?;
        let tree = PrefixTree::build(snapshot.files.keys());
        debug!(
            snapshot = %snapshot.rel_path(),
            files = snapshot.files.len(),
            blobs = blob_index.len(),
            "opened snapshot browser"
        );
        Ok(Self {
            dest,
            snapshot,
            blob_index,
            tree,
        })
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn blob_index(&self) -> &BlobIndex {
        &self.blob_index
    }

    /// True iff the path denotes the root or an interior node of the tree.
    pub fn is_dir(&self, path: &str) -> bool {
        let path = normalize_path(path);
        path.is_empty() || self.tree.nodes.contains_key(path.as_str())
    }

    /// The file with the exact normalized path.
    pub fn get_file(&self, path: &str) -> Option<&FileSnapshot> {
        self.snapshot.files.get(normalize_path(path).as_str())
    }

    /// Immediate subdirectory names under a directory path.
    pub fn list_dirs(&self, path: &str) -> Vec<String> {
        let path = normalize_path(path);
        match self.tree.nodes.get(path.as_str()) {
            Some(node) => node.dirs.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Files whose parent directory equals the given path.
    pub fn list_files(&self, path: &str) -> Vec<&FileSnapshot> {
        let path = normalize_path(path);
        match self.tree.nodes.get(path.as_str()) {
            Some(node) => node
                .files
                .iter()
                .filter_map(|p| self.snapshot.files.get(p))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Open a seekable reader over a file's bytes.
    pub fn open_file(&self, path: &str) -> Result<SnapshotFileReader<'_>> {
        let normalized = normalize_path(path);
        let file = self
            .snapshot
            .files
            .get(normalized.as_str())
            .ok_or(HoldfastError::FileNotFound(normalized))?;
        Ok(SnapshotFileReader::new(self, file.clone()))
    }

    /// Fetch a blob's plaintext from the destination.
    pub fn read_blob(&self, id: &BlobId) -> Result<Vec<u8>> {
        blob::read_blob(self.dest.as_ref(), id)
    }

    /// Final path segment of a normalized path; empty for the root.
    pub fn file_name(path: &str) -> String {
        let normalized = normalize_path(path);
        match normalized.rsplit('/').next() {
            Some(name) => name.to_string(),
            None => String::new(),
        }
    }
}

/// Normalize a browser path: `\` becomes `/`, surrounding slashes are
/// stripped, the empty path is the root.
fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_matches('/').to_string()
}

#[derive(Debug, Default)]
struct PrefixNode {
    /// Names of direct child directories.
    dirs: BTreeSet<String>,
    /// Full paths of direct child files.
    files: BTreeSet<String>,
}

/// Trie over path segments, flattened to one node per directory path. The
/// root is keyed by the empty string.
#[derive(Debug, Default)]
struct PrefixTree {
    nodes: HashMap<String, PrefixNode>,
}

impl PrefixTree {
    fn build<'a>(paths: impl Iterator<Item = &'a String>) -> Self {
        let mut nodes: HashMap<String, PrefixNode> = HashMap::new();
        nodes.entry(String::new()).or_default();
        for path in paths {
            let (dir, _) = split_parent(path);
            nodes
                .entry(dir.to_string())
                .or_default()
                .files
                .insert(path.clone());
            // Register every ancestor directory with its parent.
            let mut current = dir;
            while !current.is_empty() {
                let (parent, name) = split_parent(current);
                nodes
                    .entry(parent.to_string())
                    .or_default()
                    .dirs
                    .insert(name.to_string());
                current = parent;
            }
        }
        Self { nodes }
    }
}

/// Split a path into (parent dir, final segment). The parent of a top-level
/// name is the empty root path.
fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", path),
    }
}
