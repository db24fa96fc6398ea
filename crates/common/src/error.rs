//! Common error types shared across crates.

use thiserror::Error;

/// Error returned by every envelope operation (`put`, `get`, `seal`, `open`,
/// `generate`, `unwrap`).
///
/// Only [`EnvelopeError::KeyServiceUnavailable`] and
/// [`EnvelopeError::StorageUnavailable`] are worth retrying; nothing is retried
/// internally.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The key-management service could not be reached or failed to answer.
    #[error("key service unavailable: {0}")]
    KeyServiceUnavailable(String),

    /// The key-management service refused the request.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The wrapped data key was tampered with, or belongs to another master key.
    #[error("invalid wrapped key: {0}")]
    InvalidWrappedKey(String),

    /// The ciphertext or its tag did not verify. No plaintext is ever returned
    /// alongside this error.
    #[error("authentication failed: ciphertext or tag did not verify")]
    AuthenticationFailed,

    /// The object store could not be reached or failed to answer.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The stored object metadata is missing entries or cannot be decoded.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// The stored object names a content algorithm this build does not know.
    #[error("unsupported content algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key material of the wrong size was handed to the cipher layer.
    #[error("invalid data key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}

impl EnvelopeError {
    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            EnvelopeError::KeyServiceUnavailable(_) => "key_service_unavailable",
            EnvelopeError::AccessDenied(_) => "access_denied",
            EnvelopeError::InvalidWrappedKey(_) => "invalid_wrapped_key",
            EnvelopeError::AuthenticationFailed => "authentication_failed",
            EnvelopeError::StorageUnavailable(_) => "storage_unavailable",
            EnvelopeError::NotFound(_) => "not_found",
            EnvelopeError::InvalidEnvelope(_) => "invalid_envelope",
            EnvelopeError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            EnvelopeError::InvalidKeyLength { .. } => "invalid_key_length",
        }
    }

    /// Returns `true` when the caller may reasonably retry the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnvelopeError::KeyServiceUnavailable(_) | EnvelopeError::StorageUnavailable(_)
        )
    }
}
