//! [`MemoryObjectStore`]: process-local object store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::EnvelopeError;
use tokio::sync::RwLock;

use super::{ObjectStore, StoredObject};

/// Thread-safe in-memory [`ObjectStore`].
///
/// Clones share the same underlying map.
#[derive(Clone, Debug, Default)]
pub struct MemoryObjectStore {
    inner: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Raw stored object, bypassing decryption.
    pub async fn raw(&self, object_key: &str) -> Option<StoredObject> {
        self.inner.read().await.get(object_key).cloned()
    }

    /// Overwrite a stored object verbatim.
    pub async fn insert_raw(&self, object_key: &str, object: StoredObject) {
        self.inner.write().await.insert(object_key.to_owned(), object);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        object_key: &str,
        body: Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<(), EnvelopeError> {
        let mut lock = self.inner.write().await;
        lock.insert(object_key.to_owned(), StoredObject { body, metadata });
        Ok(())
    }

    async fn get(&self, object_key: &str) -> Result<StoredObject, EnvelopeError> {
        self.raw(object_key)
            .await
            .ok_or_else(|| EnvelopeError::NotFound(object_key.to_owned()))
    }
}
