//! Content-addressed blob storage.
//!
//! File contents live outside the relational store, keyed by
//! [`blob_key`]. The relational store only records hashes; the blob store
//! never takes part in a database transaction.

mod fs;
mod memory;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found")]
    NotFound,
    #[error("blob already exists")]
    AlreadyExists,
    #[error("invalid blob key: {0}")]
    InvalidKey(String),
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub content_type: String,
    /// Overwrite an existing object at the same key instead of failing.
    pub upsert: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            content_type: "application/octet-stream".to_string(),
            upsert: true,
        }
    }
}

/// Outcome of a multi-key removal. Missing keys count as removed.
#[derive(Debug, Default)]
pub struct RemoveReport {
    pub removed: Vec<String>,
    pub failed: Vec<(String, BlobError)>,
}

impl RemoveReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, key: &str, data: Bytes, options: UploadOptions) -> Result<(), BlobError>;

    async fn download(&self, key: &str) -> Result<Bytes, BlobError>;

    async fn exists(&self, key: &str) -> Result<bool, BlobError>;

    async fn remove(&self, keys: &[String]) -> RemoveReport;
}

/// Storage key for a piece of content within a project.
///
/// Every write and read path derives keys through this function, so identical
/// content in one project always maps to one object regardless of which
/// snapshot introduced it.
#[must_use]
pub fn blob_key(project_id: &str, hash: &str) -> String {
    format!("{project_id}/{hash}")
}

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[must_use]
pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == 64
        && hash
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}
