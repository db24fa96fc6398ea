//! Object metadata layout for envelope-encrypted objects.
//!
//! Everything needed to decrypt an object, except access to the master key,
//! is stored as object user metadata next to the ciphertext body:
//!
//! ```text
//! x-amz-key-v2                      base64(wrapped data key)
//! x-amz-iv                          base64(nonce)
//! x-amz-matdesc                     {"aws:x-amz-cek-alg":"AES/GCM/NoPadding"}
//! x-amz-wrap-alg                    kms+context
//! x-amz-cek-alg                     AES/GCM/NoPadding
//! x-amz-tag-len                     128
//! x-amz-unencrypted-content-length  14
//! ```
//!
//! The body is `ciphertext || tag`. The layout matches the AWS S3 encryption
//! client metadata format, so objects written by either side can be read by
//! the other.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Byte length of the content nonce (96 bits) for every supported algorithm.
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bits.
pub const TAG_LEN_BITS: u32 = 128;

// ---------------------------------------------------------------------------
// Metadata keys
// ---------------------------------------------------------------------------

pub const WRAPPED_KEY_HEADER: &str = "x-amz-key-v2";
pub const IV_HEADER: &str = "x-amz-iv";
pub const MATDESC_HEADER: &str = "x-amz-matdesc";
pub const WRAP_ALG_HEADER: &str = "x-amz-wrap-alg";
pub const CEK_ALG_HEADER: &str = "x-amz-cek-alg";
pub const TAG_LEN_HEADER: &str = "x-amz-tag-len";
pub const PLAINTEXT_LEN_HEADER: &str = "x-amz-unencrypted-content-length";

/// Encryption context entry binding the content algorithm into the key wrap.
pub const CEK_ALG_CONTEXT_KEY: &str = "aws:x-amz-cek-alg";

/// Key-value pairs bound into the wrapped data key as additional authenticated data.
///
/// Ordered so that the JSON form is deterministic.
pub type EncryptionContext = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

/// Symmetric algorithm used on the object body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentAlgorithm {
    /// AES-256-GCM.
    #[default]
    #[serde(rename = "AES/GCM/NoPadding")]
    Aes256Gcm,
    /// AES-256-GCM-SIV (RFC 8452), nonce-misuse resistant.
    #[serde(rename = "AES/GCM-SIV/NoPadding")]
    Aes256GcmSiv,
}

impl ContentAlgorithm {
    /// Identifier written to `x-amz-cek-alg`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentAlgorithm::Aes256Gcm => "AES/GCM/NoPadding",
            ContentAlgorithm::Aes256GcmSiv => "AES/GCM-SIV/NoPadding",
        }
    }

    /// Encryption context that binds this algorithm into the key wrap.
    pub fn encryption_context(&self) -> EncryptionContext {
        let mut ctx = EncryptionContext::new();
        ctx.insert(CEK_ALG_CONTEXT_KEY.to_owned(), self.as_str().to_owned());
        ctx
    }
}

impl fmt::Display for ContentAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentAlgorithm {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AES/GCM/NoPadding" => Ok(ContentAlgorithm::Aes256Gcm),
            "AES/GCM-SIV/NoPadding" => Ok(ContentAlgorithm::Aes256GcmSiv),
            other => Err(EnvelopeError::UnsupportedAlgorithm(other.to_owned())),
        }
    }
}

/// How the data key was wrapped by the key service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapAlgorithm {
    /// KMS wrap whose context is the plain material description
    /// (older writers; context is typically `{"kms_cmk_id": ...}`).
    Kms,
    /// KMS wrap whose context must carry `aws:x-amz-cek-alg`.
    KmsContext,
}

impl WrapAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            WrapAlgorithm::Kms => "kms",
            WrapAlgorithm::KmsContext => "kms+context",
        }
    }
}

impl FromStr for WrapAlgorithm {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kms" => Ok(WrapAlgorithm::Kms),
            "kms+context" => Ok(WrapAlgorithm::KmsContext),
            other => Err(EnvelopeError::InvalidEnvelope(format!(
                "unknown key wrap algorithm: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope metadata
// ---------------------------------------------------------------------------

/// Everything stored alongside the ciphertext body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeMetadata {
    /// Data key as wrapped by the key service. Safe to store.
    pub wrapped_key: Vec<u8>,
    /// Content nonce.
    pub nonce: [u8; NONCE_LEN],
    /// Encryption context the data key was wrapped under.
    pub context: EncryptionContext,
    pub wrap_algorithm: WrapAlgorithm,
    pub content_algorithm: ContentAlgorithm,
    /// Plaintext length, if the writer recorded it.
    pub plaintext_len: Option<u64>,
}

impl EnvelopeMetadata {
    /// Serialise into the string map stored as object user metadata.
    pub fn to_metadata(&self) -> HashMap<String, String> {
        // A BTreeMap<String, String> always serialises.
        let matdesc = serde_json::to_string(&self.context).unwrap_or_else(|_| "{}".into());

        let mut map = HashMap::new();
        map.insert(WRAPPED_KEY_HEADER.to_owned(), STANDARD.encode(&self.wrapped_key));
        map.insert(IV_HEADER.to_owned(), STANDARD.encode(self.nonce));
        map.insert(MATDESC_HEADER.to_owned(), matdesc);
        map.insert(WRAP_ALG_HEADER.to_owned(), self.wrap_algorithm.as_str().to_owned());
        map.insert(CEK_ALG_HEADER.to_owned(), self.content_algorithm.as_str().to_owned());
        map.insert(TAG_LEN_HEADER.to_owned(), TAG_LEN_BITS.to_string());
        if let Some(len) = self.plaintext_len {
            map.insert(PLAINTEXT_LEN_HEADER.to_owned(), len.to_string());
        }
        map
    }

    /// Rebuild the envelope metadata from an object's user metadata.
    ///
    /// Key lookup is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidEnvelope`] if a required entry is missing
    /// or malformed, or if the wrap context disagrees with `x-amz-cek-alg`.
    /// Returns [`EnvelopeError::UnsupportedAlgorithm`] for an unknown content
    /// algorithm.
    pub fn from_metadata(map: &HashMap<String, String>) -> Result<Self, EnvelopeError> {
        let wrapped_key = STANDARD
            .decode(required(map, WRAPPED_KEY_HEADER)?)
            .map_err(|_| invalid(WRAPPED_KEY_HEADER, "not valid base64"))?;
        if wrapped_key.is_empty() {
            return Err(invalid(WRAPPED_KEY_HEADER, "empty"));
        }

        let nonce_bytes = STANDARD
            .decode(required(map, IV_HEADER)?)
            .map_err(|_| invalid(IV_HEADER, "not valid base64"))?;
        let nonce: [u8; NONCE_LEN] = nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| invalid(IV_HEADER, "nonce must be 12 bytes"))?;

        let context: EncryptionContext = serde_json::from_str(required(map, MATDESC_HEADER)?)
            .map_err(|_| invalid(MATDESC_HEADER, "not a JSON string map"))?;

        let wrap_algorithm: WrapAlgorithm = required(map, WRAP_ALG_HEADER)?.parse()?;
        let content_algorithm: ContentAlgorithm = required(map, CEK_ALG_HEADER)?.parse()?;

        if let Some(tag_len) = lookup(map, TAG_LEN_HEADER) {
            if tag_len != TAG_LEN_BITS.to_string() {
                return Err(invalid(TAG_LEN_HEADER, "only 128-bit tags are supported"));
            }
        }

        // The context is authenticated by the key service; the header is not.
        if wrap_algorithm == WrapAlgorithm::KmsContext
            && context.get(CEK_ALG_CONTEXT_KEY).map(String::as_str)
                != Some(content_algorithm.as_str())
        {
            return Err(invalid(
                MATDESC_HEADER,
                "content algorithm does not match the encryption context",
            ));
        }

        let plaintext_len = lookup(map, PLAINTEXT_LEN_HEADER)
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|_| invalid(PLAINTEXT_LEN_HEADER, "not a decimal length"))
            })
            .transpose()?;

        Ok(Self {
            wrapped_key,
            nonce,
            context,
            wrap_algorithm,
            content_algorithm,
            plaintext_len,
        })
    }
}

fn lookup<'a>(map: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

fn required<'a>(map: &'a HashMap<String, String>, key: &str) -> Result<&'a str, EnvelopeError> {
    lookup(map, key).ok_or_else(|| EnvelopeError::InvalidEnvelope(format!("missing {key}")))
}

fn invalid(key: &str, reason: &str) -> EnvelopeError {
    EnvelopeError::InvalidEnvelope(format!("{key}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EnvelopeMetadata {
        EnvelopeMetadata {
            wrapped_key: vec![0xAB; 184],
            nonce: [7u8; NONCE_LEN],
            context: ContentAlgorithm::Aes256Gcm.encryption_context(),
            wrap_algorithm: WrapAlgorithm::KmsContext,
            content_algorithm: ContentAlgorithm::Aes256Gcm,
            plaintext_len: Some(14),
        }
    }

    #[test]
    fn metadata_round_trip() {
        let meta = sample();
        let map = meta.to_metadata();
        assert_eq!(map[WRAP_ALG_HEADER], "kms+context");
        assert_eq!(map[CEK_ALG_HEADER], "AES/GCM/NoPadding");
        assert_eq!(map[TAG_LEN_HEADER], "128");
        assert_eq!(map[MATDESC_HEADER], r#"{"aws:x-amz-cek-alg":"AES/GCM/NoPadding"}"#);
        assert_eq!(EnvelopeMetadata::from_metadata(&map).unwrap(), meta);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let map: HashMap<String, String> = sample()
            .to_metadata()
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();
        assert!(EnvelopeMetadata::from_metadata(&map).is_ok());
    }

    #[test]
    fn missing_wrapped_key_rejected() {
        let mut map = sample().to_metadata();
        map.remove(WRAPPED_KEY_HEADER);
        let err = EnvelopeMetadata::from_metadata(&map).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidEnvelope(ref m) if m.contains("x-amz-key-v2")));
    }

    #[test]
    fn short_nonce_rejected() {
        let mut map = sample().to_metadata();
        map.insert(IV_HEADER.into(), STANDARD.encode([1u8; 8]));
        assert!(matches!(
            EnvelopeMetadata::from_metadata(&map),
            Err(EnvelopeError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn unknown_content_algorithm_rejected() {
        let mut map = sample().to_metadata();
        map.insert(CEK_ALG_HEADER.into(), "AES/CBC/PKCS5Padding".into());
        assert!(matches!(
            EnvelopeMetadata::from_metadata(&map),
            Err(EnvelopeError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn algorithm_substitution_detected() {
        let mut map = sample().to_metadata();
        map.insert(CEK_ALG_HEADER.into(), "AES/GCM-SIV/NoPadding".into());
        assert!(matches!(
            EnvelopeMetadata::from_metadata(&map),
            Err(EnvelopeError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn legacy_kms_wrap_skips_context_check() {
        let mut meta = sample();
        meta.wrap_algorithm = WrapAlgorithm::Kms;
        meta.context = EncryptionContext::from([("kms_cmk_id".to_owned(), "alias/demo".to_owned())]);
        meta.plaintext_len = None;
        let map = meta.to_metadata();
        assert!(!map.contains_key(PLAINTEXT_LEN_HEADER));
        assert_eq!(EnvelopeMetadata::from_metadata(&map).unwrap(), meta);
    }

    #[test]
    fn unsupported_tag_length_rejected() {
        let mut map = sample().to_metadata();
        map.insert(TAG_LEN_HEADER.into(), "96".into());
        assert!(EnvelopeMetadata::from_metadata(&map).is_err());
    }

    #[test]
    fn algorithm_parse_and_display() {
        assert_eq!(
            "AES/GCM-SIV/NoPadding".parse::<ContentAlgorithm>().unwrap(),
            ContentAlgorithm::Aes256GcmSiv
        );
        assert_eq!(ContentAlgorithm::default().to_string(), "AES/GCM/NoPadding");
        assert!("rot13".parse::<ContentAlgorithm>().is_err());
    }
}
