//! [`Envelope`]: the persisted unit of an encrypted object.

use std::collections::HashMap;

use bytes::Bytes;
use common::{EnvelopeError, EnvelopeMetadata};

/// An encrypted object: body plus the metadata needed to decrypt it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Wrapped key, nonce and algorithm identifiers.
    pub metadata: EnvelopeMetadata,
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Split into the object body and user metadata to hand to an object store.
    pub fn into_object(self) -> (Bytes, HashMap<String, String>) {
        let metadata = self.metadata.to_metadata();
        (Bytes::from(self.ciphertext), metadata)
    }

    /// Rebuild an envelope purely from a stored object.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidEnvelope`] or
    /// [`EnvelopeError::UnsupportedAlgorithm`] if the metadata cannot be parsed.
    pub fn from_object(body: &[u8], metadata: &HashMap<String, String>) -> Result<Self, EnvelopeError> {
        Ok(Self {
            metadata: EnvelopeMetadata::from_metadata(metadata)?,
            ciphertext: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{open, seal};
    use crate::keys::{DataKey, PlaintextKey};
    use common::ContentAlgorithm;

    #[test]
    fn object_form_is_self_describing() {
        let alg = ContentAlgorithm::Aes256GcmSiv;
        let key = DataKey {
            plaintext: PlaintextKey::generate(),
            wrapped: vec![1, 2, 3, 4],
            context: alg.encryption_context(),
        };
        let envelope = seal(alg, b"payload", &key).unwrap();
        let (body, metadata) = envelope.clone().into_object();

        let rebuilt = Envelope::from_object(&body, &metadata).unwrap();
        assert_eq!(rebuilt, envelope);
        assert_eq!(open(&rebuilt, &key.plaintext).unwrap(), b"payload");
    }

    #[test]
    fn from_object_requires_metadata() {
        let err = Envelope::from_object(b"body", &HashMap::new()).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidEnvelope(_)));
    }
}
