//! Blob storage contract and backends.
//!
//! Keys are chosen by the caller and never rewritten. The reference
//! returned from `put` is derived only from the key and the store's
//! configuration, so it is stable across processes.

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use memory::MemoryBlobStore;
pub use s3::StorageService;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `data` under `key` and returns its public URL. The content
    /// type is inferred from the key's extension when not given.
    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<String, StorageError>;

    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    fn url_for(&self, key: &str) -> String;
}

/// MIME type for a key, from its file extension.
pub fn content_type_for(key: &str) -> String {
    mime_guess::from_path(key)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
