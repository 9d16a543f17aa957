//! The destination-global blob index: every known blob id and its plaintext
//! length, rewritten in full at the end of each snapshot run.

use std::collections::HashMap;

use tracing::debug;

use crate::blob::BlobId;
use crate::codec::Reader;
use crate::destination::Destination;
use crate::error::{HoldfastError, Result};

/// Destination-root file holding the blob index.
pub const BLOB_INDEX_KEY: &str = ".blob-index";

const INDEX_VERSION: u8 = 0;
/// Encoded entry size: 32-byte id + u32 length.
const ENTRY_SIZE: usize = 36;

/// Mapping from blob id to plaintext length.
#[derive(Debug, Clone, Default)]
pub struct BlobIndex {
    entries: HashMap<BlobId, u32>,
}

impl BlobIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &BlobId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &BlobId) -> Option<u32> {
        self.entries.get(id).copied()
    }

    pub fn insert(&mut self, id: BlobId, len: u32) {
        self.entries.insert(id, len);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge entries in. Overwriting an equal key is idempotent because a
    /// blob id determines its length.
    pub fn merge<I: IntoIterator<Item = (BlobId, u32)>>(&mut self, entries: I) {
        for (id, len) in entries {
            self.entries.insert(id, len);
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 4 + self.entries.len() * ENTRY_SIZE);
        out.push(INDEX_VERSION);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (id, len) in &self.entries {
            out.extend_from_slice(&id.0);
            out.extend_from_slice(&len.to_le_bytes());
        }
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let version = r.u8("blob index version")?;
        if version != INDEX_VERSION {
            return Err(HoldfastError::UnsupportedVersion(version));
        }
        let count = r.u32("blob index entry count")?;
        // Cap the pre-allocation by what the input could actually hold.
        let mut entries = HashMap::with_capacity((count as usize).min(data.len() / ENTRY_SIZE + 1));
        for _ in 0..count {
            let id = BlobId(r.array::<32>("blob index entry id")?);
            let len = r.u32("blob index entry length")?;
            entries.insert(id, len);
        }
        Ok(Self { entries })
    }

    /// Load the index from a destination. An absent file is an empty index.
    pub fn load(dest: &dyn Destination) -> Result<Self> {
        match dest.read_file(BLOB_INDEX_KEY)? {
            Some(data) => {
                let index = Self::decode(&data)?;
                debug!(entries = index.len(), "loaded blob index");
                Ok(index)
            }
            None => Ok(Self::new()),
        }
    }

    /// Rewrite the index file in full.
    pub fn store(&self, dest: &dyn Destination) -> Result<()> {
        dest.write_file(BLOB_INDEX_KEY, &self.encode())
    }
}
