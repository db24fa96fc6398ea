//! [`LocalKeyProvider`]: in-process master keys, for tests and offline runs.
//!
//! Wrapped key format:
//!
//! ```text
//! nonce(12) || AES-256-GCM-SIV(master, nonce, data key, aad = JSON(context))
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use common::protocol::NONCE_LEN;
use common::{ContentAlgorithm, EncryptionContext, EnvelopeError};
use zeroize::Zeroizing;

use super::{DataKey, KeyProvider, PlaintextKey};
use crate::crypto::cipher::{decrypt, encrypt, random_nonce};

/// [`KeyProvider`] holding its master keys in memory.
///
/// Behaves like a key service with respect to errors: an unknown master key id
/// is [`EnvelopeError::AccessDenied`], and a blob that does not authenticate
/// under the named master key and context is [`EnvelopeError::InvalidWrappedKey`].
#[derive(Default)]
pub struct LocalKeyProvider {
    master_keys: HashMap<String, PlaintextKey>,
}

impl LocalKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a master key with random key material.
    pub fn with_master_key(mut self, master_key_id: impl Into<String>) -> Self {
        self.master_keys
            .insert(master_key_id.into(), PlaintextKey::generate());
        self
    }

    /// Register a master key with the given key material.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidKeyLength`] unless `key` is 32 bytes.
    pub fn with_master_key_bytes(
        mut self,
        master_key_id: impl Into<String>,
        key: &[u8],
    ) -> Result<Self, EnvelopeError> {
        self.master_keys
            .insert(master_key_id.into(), PlaintextKey::from_slice(key)?);
        Ok(self)
    }

    fn master_key(&self, master_key_id: &str) -> Result<&PlaintextKey, EnvelopeError> {
        self.master_keys.get(master_key_id).ok_or_else(|| {
            EnvelopeError::AccessDenied(format!("unknown master key: {master_key_id}"))
        })
    }
}

#[async_trait]
impl KeyProvider for LocalKeyProvider {
    async fn generate(
        &self,
        master_key_id: &str,
        context: &EncryptionContext,
    ) -> Result<DataKey, EnvelopeError> {
        let master = self.master_key(master_key_id)?;
        let plaintext = PlaintextKey::generate();
        let nonce = random_nonce();
        let sealed = encrypt(
            ContentAlgorithm::Aes256GcmSiv,
            master.as_bytes(),
            &nonce,
            plaintext.as_bytes(),
            &context_aad(context),
        )?;

        let mut wrapped = Vec::with_capacity(NONCE_LEN + sealed.len());
        wrapped.extend_from_slice(&nonce);
        wrapped.extend_from_slice(&sealed);

        Ok(DataKey {
            plaintext,
            wrapped,
            context: context.clone(),
        })
    }

    async fn unwrap(
        &self,
        master_key_id: &str,
        wrapped_key: &[u8],
        context: &EncryptionContext,
    ) -> Result<PlaintextKey, EnvelopeError> {
        let master = self.master_key(master_key_id)?;
        if wrapped_key.len() <= NONCE_LEN {
            return Err(EnvelopeError::InvalidWrappedKey("wrapped key too short".into()));
        }
        let (nonce, sealed) = wrapped_key.split_at(NONCE_LEN);
        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| EnvelopeError::InvalidWrappedKey("bad nonce".into()))?;

        let plaintext = Zeroizing::new(
            decrypt(
                ContentAlgorithm::Aes256GcmSiv,
                master.as_bytes(),
                &nonce,
                sealed,
                &context_aad(context),
            )
            .map_err(|_| {
                EnvelopeError::InvalidWrappedKey(format!(
                    "wrapped key does not verify under {master_key_id}"
                ))
            })?,
        );
        PlaintextKey::from_slice(&plaintext)
            .map_err(|e| EnvelopeError::InvalidWrappedKey(e.to_string()))
    }
}

/// Canonical AAD for a context: its JSON form (keys are ordered).
fn context_aad(context: &EncryptionContext) -> Vec<u8> {
    serde_json::to_vec(context).unwrap_or_default()
}
