//! Authenticated encryption of object bodies under a per-object data key.
//!
//! Two content algorithms are supported, selected by [`ContentAlgorithm`]:
//!
//! - **AES-256-GCM** — the default, and the algorithm other S3 encryption
//!   clients write.
//! - **AES-256-GCM-SIV** (RFC 8452) — nonce-misuse resistant.
//!
//! Every call to [`seal`] draws a fresh 96-bit nonce from the OS CSPRNG. Since
//! each object also gets its own data key, a (key, nonce) pair is never reused.
//! **Never** call `encrypt` with a caller-chosen nonce outside of tests.

use aes_gcm::Aes256Gcm;
use aes_gcm_siv::{
    aead::{self, rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    Aes256GcmSiv,
};
use common::protocol::{NONCE_LEN, TAG_LEN_BITS};
use common::{ContentAlgorithm, EnvelopeError, EnvelopeMetadata, WrapAlgorithm};

use super::envelope::Envelope;
use crate::keys::{DataKey, PlaintextKey};

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of the authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = (TAG_LEN_BITS / 8) as usize;

/// Encrypt `plaintext` under `data_key`, producing a self-describing [`Envelope`].
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidEnvelope`] if the AEAD refuses the input
/// (only possible for plaintexts beyond the algorithm's length limit).
pub fn seal(
    algorithm: ContentAlgorithm,
    plaintext: &[u8],
    data_key: &DataKey,
) -> Result<Envelope, EnvelopeError> {
    let nonce = random_nonce();
    let ciphertext = encrypt(algorithm, data_key.plaintext.as_bytes(), &nonce, plaintext, &[])?;

    Ok(Envelope {
        metadata: EnvelopeMetadata {
            wrapped_key: data_key.wrapped.clone(),
            nonce,
            context: data_key.context.clone(),
            wrap_algorithm: WrapAlgorithm::KmsContext,
            content_algorithm: algorithm,
            plaintext_len: Some(plaintext.len() as u64),
        },
        ciphertext,
    })
}

/// Verify and decrypt an [`Envelope`] with the unwrapped data key.
///
/// # Errors
///
/// Returns [`EnvelopeError::AuthenticationFailed`] if the tag does not verify
/// (tampered body, wrong key, corrupted nonce). No plaintext is returned in
/// that case. Returns [`EnvelopeError::InvalidEnvelope`] if the plaintext
/// length disagrees with the recorded one.
pub fn open(envelope: &Envelope, key: &PlaintextKey) -> Result<Vec<u8>, EnvelopeError> {
    let meta = &envelope.metadata;
    let plaintext = decrypt(
        meta.content_algorithm,
        key.as_bytes(),
        &meta.nonce,
        &envelope.ciphertext,
        &[],
    )?;

    if let Some(expected) = meta.plaintext_len {
        if expected != plaintext.len() as u64 {
            return Err(EnvelopeError::InvalidEnvelope(format!(
                "decrypted {} bytes, metadata records {expected}",
                plaintext.len()
            )));
        }
    }
    Ok(plaintext)
}

/// Encrypt with an explicit nonce and additional authenticated data.
///
/// Output is `ciphertext || tag` and is deterministic in all inputs.
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
pub(crate) fn encrypt(
    algorithm: ContentAlgorithm,
    key: &[u8],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    check_key_len(key)?;
    let payload = Payload { msg: plaintext, aad };
    let result = match algorithm {
        ContentAlgorithm::Aes256Gcm => aead_encrypt(build_cipher::<Aes256Gcm>(key)?, nonce, payload),
        ContentAlgorithm::Aes256GcmSiv => {
            aead_encrypt(build_cipher::<Aes256GcmSiv>(key)?, nonce, payload)
        }
    };
    result.map_err(|_| EnvelopeError::InvalidEnvelope("aead seal failed".into()))
}

/// Verify and decrypt `ciphertext || tag`.
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
/// Returns [`EnvelopeError::AuthenticationFailed`] on any verification failure.
pub(crate) fn decrypt(
    algorithm: ContentAlgorithm,
    key: &[u8],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    check_key_len(key)?;
    if ciphertext.len() < TAG_LEN {
        return Err(EnvelopeError::AuthenticationFailed);
    }
    let payload = Payload { msg: ciphertext, aad };
    let result = match algorithm {
        ContentAlgorithm::Aes256Gcm => aead_decrypt(build_cipher::<Aes256Gcm>(key)?, nonce, payload),
        ContentAlgorithm::Aes256GcmSiv => {
            aead_decrypt(build_cipher::<Aes256GcmSiv>(key)?, nonce, payload)
        }
    };
    result.map_err(|_| EnvelopeError::AuthenticationFailed)
}

/// Draw a fresh nonce from the OS CSPRNG.
pub(crate) fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn aead_encrypt<C: Aead>(
    cipher: C,
    nonce: &[u8; NONCE_LEN],
    payload: Payload<'_, '_>,
) -> Result<Vec<u8>, aead::Error> {
    cipher.encrypt(aead::Nonce::<C>::from_slice(nonce), payload)
}

fn aead_decrypt<C: Aead>(
    cipher: C,
    nonce: &[u8; NONCE_LEN],
    payload: Payload<'_, '_>,
) -> Result<Vec<u8>, aead::Error> {
    cipher.decrypt(aead::Nonce::<C>::from_slice(nonce), payload)
}

fn build_cipher<C: KeyInit>(key: &[u8]) -> Result<C, EnvelopeError> {
    C::new_from_slice(key).map_err(|_| EnvelopeError::InvalidKeyLength {
        expected: KEY_LEN,
        actual: key.len(),
    })
}

fn check_key_len(key: &[u8]) -> Result<(), EnvelopeError> {
    if key.len() != KEY_LEN {
        return Err(EnvelopeError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: key.len(),
        });
    }
    Ok(())
}
