//! Snapshot manifests: the captured file tree and each file's blob chain.

pub mod catalog;

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

use crate::blob::BlobId;
use crate::codec::{write_cstring, Reader};
use crate::error::{HoldfastError, Result};

/// Manifest file name inside a snapshot directory.
pub const MANIFEST_FILE_NAME: &str = ".snapshot";

/// Directory-name format for snapshot timestamps (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

const MANIFEST_VERSION: u8 = 0;

/// One captured file: its relative path, mtime, size and blob chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSnapshot {
    /// `/`-separated path relative to the source root, no leading slash.
    pub path: String,
    /// Millisecond precision; drives the unchanged-file fast path.
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    /// Blob ids in byte order of the file. Empty for zero-byte files.
    pub blobs: Vec<BlobId>,
}

/// A snapshot manifest.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Second precision; also determines the snapshot directory name.
    pub created_at: DateTime<Utc>,
    pub total_size: u64,
    pub files: HashMap<String, FileSnapshot>,
}

impl Snapshot {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at: truncate_to_seconds(created_at),
            total_size: 0,
            files: HashMap::new(),
        }
    }

    /// Directory name of this snapshot at the destination.
    pub fn rel_path(&self) -> String {
        format_timestamp(self.created_at)
    }

    /// Destination key of this snapshot's manifest file.
    pub fn manifest_key(&self) -> String {
        format!("{}/{}", self.rel_path(), MANIFEST_FILE_NAME)
    }

    /// Serialize the manifest. Files are emitted in sorted path order so the
    /// output is deterministic; decoding accepts any order.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.push(MANIFEST_VERSION);
        out.extend_from_slice(&(self.created_at.timestamp() as u64).to_le_bytes());
        out.extend_from_slice(&self.total_size.to_le_bytes());
        out.extend_from_slice(&(self.files.len() as u32).to_le_bytes());

        let mut paths: Vec<&String> = self.files.keys().collect();
        paths.sort();
        for path in paths {
            let file = &self.files[path];
            write_cstring(&mut out, &file.path)?;
            out.extend_from_slice(&(file.last_modified.timestamp_millis() as u64).to_le_bytes());
            out.extend_from_slice(&file.size.to_le_bytes());
            out.extend_from_slice(&(file.blobs.len() as u32).to_le_bytes());
            for blob in &file.blobs {
                out.extend_from_slice(&blob.0);
            }
        }
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let version = r.u8("manifest version")?;
        if version != MANIFEST_VERSION {
            return Err(HoldfastError::UnsupportedVersion(version));
        }

        let created_at = from_unix_seconds(r.u64("manifest created-at")? as i64)
            .ok_or_else(|| HoldfastError::InvalidFormat("manifest created-at out of range".into()))?;
        let total_size = r.u64("manifest total size")?;
        let file_count = r.u32("manifest file count")?;

        // Cap pre-allocations by what the input could actually hold.
        let mut files = HashMap::with_capacity((file_count as usize).min(data.len() / 21 + 1));
        for _ in 0..file_count {
            let path = r.cstring("file path")?;
            let last_modified = from_unix_millis(r.u64("file last-modified")? as i64)
                .ok_or_else(|| HoldfastError::InvalidFormat("file last-modified out of range".into()))?;
            let size = r.u64("file size")?;
            let blob_count = r.u32("file blob count")?;
            let mut blobs = Vec::with_capacity((blob_count as usize).min(data.len() / 32 + 1));
            for _ in 0..blob_count {
                blobs.push(BlobId(r.array::<32>("file blob id")?));
            }
            files.insert(
                path.clone(),
                FileSnapshot {
                    path,
                    last_modified,
                    size,
                    blobs,
                },
            );
        }

        Ok(Self {
            created_at,
            total_size,
            files,
        })
    }
}

/// Render a snapshot timestamp as its destination directory name.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a destination directory name as a snapshot timestamp.
pub fn parse_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let naive = chrono::NaiveDateTime::parse_from_str(name, TIMESTAMP_FORMAT).ok()?;
    Some(naive.and_utc())
}

/// Truncate an instant to whole seconds (snapshot resolution).
pub fn truncate_to_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
    from_unix_seconds(t.timestamp()).unwrap_or(t)
}

/// Truncate an instant to whole milliseconds (file mtime resolution).
pub fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    from_unix_millis(t.timestamp_millis()).unwrap_or(t)
}

fn from_unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

fn from_unix_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
