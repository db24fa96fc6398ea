//! Per-object data keys: minting, wrapping and unwrapping.
//!
//! # Lifecycle
//!
//! 1. On `put`, [`KeyProvider::generate`] asks the key service for a fresh
//!    256-bit data key. The plaintext half lives only in memory; the wrapped
//!    half is stored with the object.
//! 2. On `get`, [`KeyProvider::unwrap`] hands the wrapped key back to the key
//!    service to recover the plaintext key.
//! 3. The plaintext key is dropped as soon as the body is sealed or opened, and
//!    its memory is zeroed on drop.
//!
//! # Security invariants
//!
//! - Plaintext key bytes are **never** logged, traced or persisted.
//! - No data key is cached or shared between objects.

pub mod kms;
pub mod local;

pub use kms::KmsKeyProvider;
pub use local::LocalKeyProvider;

use std::fmt;

use aes_gcm_siv::aead::{rand_core::RngCore, OsRng};
use async_trait::async_trait;
use common::{EncryptionContext, EnvelopeError};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::KEY_LEN;

/// Source of per-object data keys, backed by a key-management service.
///
/// Every call is a round-trip to the service; implementations must not cache.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Mint a new data key under `master_key_id`, bound to `context`.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::KeyServiceUnavailable`] if the service cannot be
    /// reached, [`EnvelopeError::AccessDenied`] if it refuses the request.
    async fn generate(
        &self,
        master_key_id: &str,
        context: &EncryptionContext,
    ) -> Result<DataKey, EnvelopeError>;

    /// Recover the plaintext of a data key previously wrapped under
    /// `master_key_id` with the same `context`.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::KeyServiceUnavailable`], [`EnvelopeError::AccessDenied`],
    /// or [`EnvelopeError::InvalidWrappedKey`] when the blob was tampered with,
    /// wrapped under another master key, or under another context.
    async fn unwrap(
        &self,
        master_key_id: &str,
        wrapped_key: &[u8],
        context: &EncryptionContext,
    ) -> Result<PlaintextKey, EnvelopeError>;
}

/// A 256-bit plaintext data key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PlaintextKey {
    bytes: [u8; KEY_LEN],
}

impl PlaintextKey {
    /// Copy key material out of a service response.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidKeyLength`] unless `bytes` is exactly
    /// [`KEY_LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| EnvelopeError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self { bytes })
    }

    /// Draw a random key from the OS CSPRNG.
    pub(crate) fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for PlaintextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("PlaintextKey([REDACTED])")
    }
}

/// A freshly minted data key: plaintext for sealing, wrapped form for storage.
#[derive(Debug)]
pub struct DataKey {
    pub plaintext: PlaintextKey,
    /// Opaque blob returned by the key service. Safe to persist.
    pub wrapped: Vec<u8>,
    /// Context the key was wrapped under; must be supplied again to unwrap.
    pub context: EncryptionContext,
}
