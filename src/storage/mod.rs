//! # Storage Sink
//!
//! Durable object storage for backup streams. Backends implement
//! [`ObjectStore`], which consumes a byte stream of unknown length and stores
//! it under a key, reading at most one part at a time.
//!
//! ## Backends
//!
//! - [`S3ObjectStore`]: AWS S3 (or an S3-compatible endpoint) using multipart
//!   uploads with one part in flight (feature `aws`)
//! - [`MemoryObjectStore`]: in-process store for tests
//! - [`DiscardObjectStore`]: reads and drops every body, for dry runs

pub mod discard;
pub mod memory;
#[cfg(feature = "aws")]
pub mod s3;

use async_trait::async_trait;
use std::io::Cursor;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::BackupConfig;

pub use discard::DiscardObjectStore;
pub use memory::{MemoryObjectStore, StoreEvent, StoredObject};
#[cfg(feature = "aws")]
pub use s3::S3ObjectStore;

/// A pull-based byte stream handed from one pipeline stage to the next.
pub type ByteSource = Pin<Box<dyn AsyncRead + Send>>;

/// Per-upload storage parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub bucket: String,
    pub region: String,
    pub storage_class: String,
    /// Maximum bytes per uploaded part
    pub part_size: u64,
}

impl From<&BackupConfig> for PutOptions {
    fn from(config: &BackupConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            storage_class: config.storage_class.clone(),
            part_size: config.part_size,
        }
    }
}

/// Errors raised by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading the upload body failed (the upstream stage broke)
    #[error("failed to read upload body for '{key}': {source}")]
    Body {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The storage service rejected or failed a request
    #[error("storage request for '{key}' failed: {message}")]
    Request {
        key: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The upload options cannot be used
    #[error("invalid upload options: {message}")]
    InvalidOptions { message: String },
}

impl StorageError {
    /// Create a body read error
    pub fn body(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Body { key: key.into(), source }
    }

    /// Create a request error with an underlying cause
    pub fn request<E>(key: impl Into<String>, message: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Request { key: key.into(), message: message.into(), source: Some(source.into()) }
    }

    /// Create a request error without an underlying cause
    pub fn request_message(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request { key: key.into(), message: message.into(), source: None }
    }

    /// Create an invalid options error
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions { message: message.into() }
    }
}

/// Durable storage for byte streams.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` and return a location descriptor for it.
    ///
    /// Implementations read the body part by part and never retry; a
    /// failure is returned to the caller as-is.
    async fn put(
        &self,
        key: &str,
        body: ByteSource,
        options: &PutOptions,
    ) -> Result<String, StorageError>;
}

/// Store a small in-memory payload through any [`ObjectStore`].
pub async fn put_bytes(
    store: &dyn ObjectStore,
    key: &str,
    bytes: Vec<u8>,
    options: &PutOptions,
) -> Result<String, StorageError> {
    store.put(key, Box::pin(Cursor::new(bytes)), options).await
}

/// Read the next part of at most `part_size` bytes. An empty part means the
/// stream is exhausted.
pub(crate) async fn read_part(
    body: &mut ByteSource,
    key: &str,
    part_size: u64,
) -> Result<Vec<u8>, StorageError> {
    if part_size == 0 {
        return Err(StorageError::invalid_options("part size must be greater than zero"));
    }

    let mut part = Vec::new();
    body.take(part_size).read_to_end(&mut part).await.map_err(|e| StorageError::body(key, e))?;
    Ok(part)
}
