//! Object store that reads and drops everything it is given.
//!
//! Used by `--dry-run`: the dump and cipher stages run for real while the
//! sink reads part by part, so memory stays bounded by one part.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use super::{read_part, ByteSource, ObjectStore, PutOptions, StorageError};

#[derive(Debug, Default)]
pub struct DiscardObjectStore {
    discarded: AtomicU64,
}

impl DiscardObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Location descriptor returned for `key` in `bucket`.
    pub fn location(bucket: &str, key: &str) -> String {
        format!("dry-run://{}/{}", bucket, key)
    }

    /// Total bytes read and dropped so far.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ObjectStore for DiscardObjectStore {
    async fn put(
        &self,
        key: &str,
        mut body: ByteSource,
        options: &PutOptions,
    ) -> Result<String, StorageError> {
        let mut bytes = 0u64;
        let mut parts = 0usize;
        loop {
            let part = read_part(&mut body, key, options.part_size).await?;
            if part.is_empty() {
                break;
            }
            parts += 1;
            bytes += part.len() as u64;
        }

        self.discarded.fetch_add(bytes, Ordering::Relaxed);
        info!(key = %key, bytes, parts, "Dry run: discarded upload");
        Ok(Self::location(&options.bucket, key))
    }
}
