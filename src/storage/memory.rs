//! In-process object store.
//!
//! Keeps uploaded objects in memory and records the order in which uploads
//! start and finish, which makes it useful for asserting on pipeline ordering
//! in tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{read_part, ByteSource, ObjectStore, PutOptions, StorageError};

/// Upload lifecycle event recorded by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Started { key: String },
    Completed { key: String },
    Failed { key: String },
}

/// An object held by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub storage_class: String,
    pub body: Vec<u8>,
    /// Number of parts the body was received in
    pub parts: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<String, StoredObject>,
    events: Vec<StoreEvent>,
}

/// Object store that keeps everything in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: StoreEvent) {
        self.state().events.push(event);
    }

    /// Location descriptor returned for `key` in `bucket`.
    pub fn location(bucket: &str, key: &str) -> String {
        format!("memory://{}/{}", bucket, key)
    }

    /// A stored object, if present.
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state().objects.get(key).cloned()
    }

    /// Keys of all stored objects in lexical order.
    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    /// Upload events in the order they happened.
    pub fn events(&self) -> Vec<StoreEvent> {
        self.state().events.clone()
    }

    async fn receive(
        &self,
        key: &str,
        mut body: ByteSource,
        part_size: u64,
    ) -> Result<(Vec<u8>, usize), StorageError> {
        let mut received = Vec::new();
        let mut parts = 0;
        loop {
            let part = read_part(&mut body, key, part_size).await?;
            if part.is_empty() {
                break;
            }
            parts += 1;
            received.extend_from_slice(&part);
        }
        Ok((received, parts))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        body: ByteSource,
        options: &PutOptions,
    ) -> Result<String, StorageError> {
        self.record(StoreEvent::Started { key: key.to_string() });

        match self.receive(key, body, options.part_size).await {
            Ok((body, parts)) => {
                let object = StoredObject {
                    bucket: options.bucket.clone(),
                    storage_class: options.storage_class.clone(),
                    body,
                    parts,
                };
                let mut state = self.state();
                state.objects.insert(key.to_string(), object);
                state.events.push(StoreEvent::Completed { key: key.to_string() });
                Ok(Self::location(&options.bucket, key))
            }
            Err(err) => {
                self.record(StoreEvent::Failed { key: key.to_string() });
                Err(err)
            }
        }
    }
}
