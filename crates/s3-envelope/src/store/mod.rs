//! Object storage collaborator: put/get of a named blob plus string metadata.
//!
//! The encryption client only depends on the [`ObjectStore`] trait. Network
//! failures surface as [`EnvelopeError::StorageUnavailable`] and are left to
//! the caller to retry.

pub mod memory;
pub mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use common::EnvelopeError;

/// A stored blob and its user metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub metadata: HashMap<String, String>,
}

/// Minimal blob store interface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` and `metadata` under `object_key`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::StorageUnavailable`] on any store failure.
    async fn put(
        &self,
        object_key: &str,
        body: Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<(), EnvelopeError>;

    /// Fetch the object stored under `object_key`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::NotFound`] if no such object exists, and
    /// [`EnvelopeError::StorageUnavailable`] on any other failure.
    async fn get(&self, object_key: &str) -> Result<StoredObject, EnvelopeError>;
}
