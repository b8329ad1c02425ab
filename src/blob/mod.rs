mod fs;

pub use fs::FsBlobStore;

use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found")]
    NotFound,
    #[error("invalid blob id")]
    InvalidId,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlobError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// Binary content of uploaded files, keyed by file id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, file_id: &str, data: Bytes) -> Result<(), BlobError>;
    async fn get(&self, file_id: &str) -> Result<Bytes, BlobError>;
    /// Returns whether a blob was removed.
    async fn delete(&self, file_id: &str) -> Result<bool, BlobError>;
}

pub type SharedBlobStore = Arc<dyn BlobStore>;

/// Lowercase hex SHA-256 of `data`, recorded as the file hash.
#[must_use]
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn validate_id(id: &str) -> Result<(), BlobError> {
    if id.len() < 2 || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(BlobError::InvalidId);
    }
    Ok(())
}
