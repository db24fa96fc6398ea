//! [`EncryptionClient`]: encrypt-then-put and get-then-decrypt.
//!
//! ```text
//! put: KeyProvider::generate -> seal -> ObjectStore::put
//! get: ObjectStore::get -> KeyProvider::unwrap -> open
//! ```
//!
//! Each put mints its own data key. Nothing is retried and nothing is cached;
//! every error reaches the caller unchanged.

use std::sync::Arc;

use common::{ContentAlgorithm, EnvelopeError};
use tracing::{debug, instrument, warn};

use crate::aws::AwsClients;
use crate::config::Config;
use crate::crypto::{self, Envelope};
use crate::keys::{KeyProvider, KmsKeyProvider};
use crate::store::{ObjectStore, S3ObjectStore};

/// Client-side envelope encryption over an object store.
///
/// Holds no mutable state; clones are cheap and may be used from separate
/// tasks.
#[derive(Clone)]
pub struct EncryptionClient {
    master_key_id: String,
    algorithm: ContentAlgorithm,
    keys: Arc<dyn KeyProvider>,
    store: Arc<dyn ObjectStore>,
}

impl EncryptionClient {
    /// Build a client from its collaborators. New objects use the default
    /// content algorithm.
    pub fn new(
        master_key_id: impl Into<String>,
        keys: Arc<dyn KeyProvider>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            master_key_id: master_key_id.into(),
            algorithm: ContentAlgorithm::default(),
            keys,
            store,
        }
    }

    /// Use `algorithm` for objects written by this client. Reads always follow
    /// the algorithm recorded on the object.
    pub fn with_algorithm(mut self, algorithm: ContentAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Build a KMS + S3 client from configuration.
    pub async fn from_config(cfg: &Config) -> Self {
        let aws = AwsClients::init(cfg).await;
        Self::new(
            cfg.kms_key_id.clone(),
            Arc::new(KmsKeyProvider::new(aws.kms)),
            Arc::new(S3ObjectStore::new(aws.s3, cfg.s3_bucket.clone())),
        )
        .with_algorithm(cfg.content_algorithm)
    }

    pub fn algorithm(&self) -> ContentAlgorithm {
        self.algorithm
    }

    /// Encrypt `plaintext` under a fresh data key and store it as `object_key`.
    ///
    /// # Errors
    ///
    /// Key-service errors from [`KeyProvider::generate`] and storage errors from
    /// [`ObjectStore::put`], unchanged.
    #[instrument(
        skip(self, plaintext),
        fields(algorithm = %self.algorithm, bytes = plaintext.len())
    )]
    pub async fn put(&self, object_key: &str, plaintext: &[u8]) -> Result<(), EnvelopeError> {
        let context = self.algorithm.encryption_context();
        let data_key = self.keys.generate(&self.master_key_id, &context).await?;
        let envelope = crypto::seal(self.algorithm, plaintext, &data_key)?;
        drop(data_key);

        let (body, metadata) = envelope.into_object();
        self.store.put(object_key, body, metadata).await?;
        debug!("encrypted object stored");
        Ok(())
    }

    /// Fetch `object_key` and return its decrypted body.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::NotFound`] if the object does not exist;
    /// [`EnvelopeError::AuthenticationFailed`] if the body was tampered with or
    /// corrupted, in which case no plaintext is returned; otherwise the
    /// storage, metadata or key-service error, unchanged.
    #[instrument(skip(self))]
    pub async fn get(&self, object_key: &str) -> Result<Vec<u8>, EnvelopeError> {
        let object = self.store.get(object_key).await?;
        let envelope = Envelope::from_object(&object.body, &object.metadata)?;

        let key = self
            .keys
            .unwrap(
                &self.master_key_id,
                &envelope.metadata.wrapped_key,
                &envelope.metadata.context,
            )
            .await?;
        let plaintext = crypto::open(&envelope, &key).map_err(|e| {
            if matches!(e, EnvelopeError::AuthenticationFailed) {
                warn!("object failed authentication; refusing to return plaintext");
            }
            e
        })?;
        drop(key);

        debug!(
            algorithm = %envelope.metadata.content_algorithm,
            bytes = plaintext.len(),
            "object decrypted"
        );
        Ok(plaintext)
    }
}
