//! Content-addressed blob identifiers and the blob store layout.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::destination::Destination;
use crate::error::{HoldfastError, Result};

/// Maximum plaintext size of a single blob.
pub const BLOB_SIZE: usize = 50 * 1024 * 1024;

/// Root directory of the blob fan-out at a destination.
pub const BLOB_ROOT: &str = ".blobs";

/// A 32-byte blob identifier: SHA-256 over the blob's plaintext bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub [u8; 32]);

impl BlobId {
    /// Compute the id of a blob body.
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        BlobId(out)
    }

    /// Hex-encode the full id.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Fan-out directory for this blob: `.blobs/aa/bb/cc/dd`. The four
    /// levels bound each directory to at most 256 entries.
    pub fn fanout_dir(&self) -> String {
        let h = self.to_hex();
        format!(
            "{BLOB_ROOT}/{}/{}/{}/{}",
            &h[0..2],
            &h[2..4],
            &h[4..6],
            &h[6..8]
        )
    }

    /// Full storage key: the fan-out directory plus the remaining hex digits.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.fanout_dir(), &self.to_hex()[8..])
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Write a blob under its content address. Rewriting an existing id is a
/// no-op in effect because the body is determined by the id.
pub fn write_blob(dest: &dyn Destination, id: &BlobId, data: &[u8]) -> Result<()> {
    dest.create_dir(&id.fanout_dir())?;
    dest.write_file(&id.storage_key(), data)
}

/// Read a blob's plaintext bytes.
pub fn read_blob(dest: &dyn Destination, id: &BlobId) -> Result<Vec<u8>> {
    dest.read_file(&id.storage_key())?
        .ok_or(HoldfastError::BlobMissing(*id))
}
