use thiserror::Error;

use crate::blob::BlobId;

pub type Result<T> = std::result::Result<T, HoldfastError>;

#[derive(Debug, Error)]
pub enum HoldfastError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),

    #[error("blob {0} is missing from the destination")]
    BlobMissing(BlobId),

    #[error("blob {0} is missing from the blob index")]
    BlobNotInIndex(BlobId),

    #[error("snapshot not found: '{0}'")]
    SnapshotNotFound(String),

    #[error("snapshot '{0}' already exists at the destination")]
    SnapshotCollision(String),

    #[error("file not found in snapshot: '{0}'")]
    FileNotFound(String),

    #[error("destination is inconsistent: {0}")]
    Inconsistent(String),

    #[error("{0}")]
    Other(String),
}
