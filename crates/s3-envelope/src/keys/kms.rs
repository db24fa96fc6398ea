//! [`KmsKeyProvider`]: data keys minted and unwrapped by AWS KMS.

use std::error::Error as StdError;
use std::fmt::Debug;

use async_trait::async_trait;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::DataKeySpec;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use common::{EncryptionContext, EnvelopeError};
use tracing::debug;
use zeroize::Zeroizing;

use super::{DataKey, KeyProvider, PlaintextKey};

/// [`KeyProvider`] backed by AWS KMS `GenerateDataKey` / `Decrypt`.
///
/// `Decrypt` is always pinned to the configured master key, so a blob wrapped
/// under any other key is rejected by KMS with `IncorrectKeyException`.
#[derive(Clone, Debug)]
pub struct KmsKeyProvider {
    client: aws_sdk_kms::Client,
}

impl KmsKeyProvider {
    pub fn new(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeyProvider for KmsKeyProvider {
    async fn generate(
        &self,
        master_key_id: &str,
        context: &EncryptionContext,
    ) -> Result<DataKey, EnvelopeError> {
        let resp = self
            .client
            .generate_data_key()
            .key_id(master_key_id)
            .key_spec(DataKeySpec::Aes256)
            .set_encryption_context(Some(context.clone().into_iter().collect()))
            .send()
            .await
            .map_err(|e| kms_failure("GenerateDataKey", e))?;

        let wrapped = resp
            .ciphertext_blob
            .ok_or_else(|| {
                EnvelopeError::KeyServiceUnavailable(
                    "GenerateDataKey response contained no ciphertext blob".into(),
                )
            })?
            .into_inner();

        let plaintext = Zeroizing::new(
            resp.plaintext
                .ok_or_else(|| {
                    EnvelopeError::KeyServiceUnavailable(
                        "GenerateDataKey response contained no plaintext".into(),
                    )
                })?
                .into_inner(),
        );
        let plaintext = PlaintextKey::from_slice(&plaintext).map_err(|e| {
            EnvelopeError::KeyServiceUnavailable(format!("GenerateDataKey returned bad key: {e}"))
        })?;

        debug!(wrapped_len = wrapped.len(), "data key generated");
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
        let resp = self
            .client
            .decrypt()
            .key_id(master_key_id)
            .ciphertext_blob(Blob::new(wrapped_key.to_vec()))
            .set_encryption_context(Some(context.clone().into_iter().collect()))
            .send()
            .await
            .map_err(|e| kms_failure("Decrypt", e))?;

        let plaintext = Zeroizing::new(
            resp.plaintext
                .ok_or_else(|| {
                    EnvelopeError::KeyServiceUnavailable(
                        "Decrypt response contained no plaintext".into(),
                    )
                })?
                .into_inner(),
        );

        debug!("data key unwrapped");
        PlaintextKey::from_slice(&plaintext).map_err(|e| {
            EnvelopeError::KeyServiceUnavailable(format!("Decrypt returned bad key: {e}"))
        })
    }
}

/// Translate a KMS SDK failure into the envelope error taxonomy.
fn kms_failure<E, R>(operation: &str, err: SdkError<E, R>) -> EnvelopeError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: Debug,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_owned);
    let message = format!("{operation}: {}", DisplayErrorContext(&err));
    classify_kms_code(code.as_deref(), message)
}

/// Map a KMS error code to an [`EnvelopeError`].
///
/// Transport failures and timeouts carry no code and land on
/// [`EnvelopeError::KeyServiceUnavailable`].
fn classify_kms_code(code: Option<&str>, message: String) -> EnvelopeError {
    match code {
        Some("AccessDeniedException") => EnvelopeError::AccessDenied(message),
        Some("InvalidCiphertextException" | "IncorrectKeyException") => {
            EnvelopeError::InvalidWrappedKey(message)
        }
        // NotFoundException, DisabledException and KMSInvalidStateException
        // land here too. They are configuration faults on the master key and
        // do not clear up on retry.
        _ => EnvelopeError::KeyServiceUnavailable(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_kms::config::retry::RetryConfig;
    use aws_sdk_kms::config::{BehaviorVersion, Credentials, Region};
    use aws_smithy_http_client::test_util::{ReplayEvent, StaticReplayClient};
    use aws_smithy_types::base64;
    use aws_smithy_types::body::SdkBody;
    use common::ContentAlgorithm;

    const KEY_ID: &str = "arn:aws:kms:us-east-1:111122223333:key/test";

    fn ctx() -> EncryptionContext {
        ContentAlgorithm::Aes256Gcm.encryption_context()
    }

    fn kms_response(status: u16, body: String) -> ReplayEvent {
        ReplayEvent::new(
            http::Request::builder()
                .uri("https://kms.us-east-1.amazonaws.com/")
                .body(SdkBody::empty())
                .unwrap(),
            http::Response::builder()
                .status(status)
                .header("content-type", "application/x-amz-json-1.1")
                .body(SdkBody::from(body))
                .unwrap(),
        )
    }

    fn kms_error(code: &str) -> ReplayEvent {
        kms_response(400, format!(r#"{{"__type":"{code}","message":"{code} raised"}}"#))
    }

    fn provider(events: Vec<ReplayEvent>) -> KmsKeyProvider {
        let conf = aws_sdk_kms::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKID", "SECRET", None, None, "test"))
            .retry_config(RetryConfig::disabled())
            .http_client(StaticReplayClient::new(events))
            .build();
        KmsKeyProvider::new(aws_sdk_kms::Client::from_conf(conf))
    }

    fn generate_body(plaintext: Option<&[u8]>, wrapped: Option<&[u8]>) -> String {
        let mut fields = vec![format!(r#""KeyId":"{KEY_ID}""#)];
        if let Some(p) = plaintext {
            fields.push(format!(r#""Plaintext":"{}""#, base64::encode(p)));
        }
        if let Some(w) = wrapped {
            fields.push(format!(r#""CiphertextBlob":"{}""#, base64::encode(w)));
        }
        format!("{{{}}}", fields.join(","))
    }

    #[tokio::test]
    async fn generate_returns_plaintext_and_wrapped_key() {
        let p = provider(vec![kms_response(
            200,
            generate_body(Some(&[7u8; 32]), Some(&[9u8; 40])),
        )]);
        let key = p.generate(KEY_ID, &ctx()).await.unwrap();
        assert_eq!(key.plaintext.as_bytes(), &[7u8; 32]);
        assert_eq!(key.wrapped, vec![9u8; 40]);
        assert_eq!(key.context, ctx());
    }

    #[tokio::test]
    async fn generate_with_short_plaintext_is_unavailable() {
        let p = provider(vec![kms_response(
            200,
            generate_body(Some(&[7u8; 16]), Some(&[9u8; 40])),
        )]);
        assert!(matches!(
            p.generate(KEY_ID, &ctx()).await,
            Err(EnvelopeError::KeyServiceUnavailable(ref m)) if m.contains("bad key")
        ));
    }

    #[tokio::test]
    async fn generate_without_ciphertext_blob_is_reported() {
        let p = provider(vec![kms_response(200, generate_body(Some(&[7u8; 32]), None))]);
        assert!(matches!(
            p.generate(KEY_ID, &ctx()).await,
            Err(EnvelopeError::KeyServiceUnavailable(ref m)) if m.contains("no ciphertext blob")
        ));
    }

    #[tokio::test]
    async fn generate_without_plaintext_is_reported() {
        let p = provider(vec![kms_response(200, generate_body(None, Some(&[9u8; 40])))]);
        assert!(matches!(
            p.generate(KEY_ID, &ctx()).await,
            Err(EnvelopeError::KeyServiceUnavailable(ref m)) if m.contains("no plaintext")
        ));
    }

    #[tokio::test]
    async fn generate_access_denied() {
        let p = provider(vec![kms_error("AccessDeniedException")]);
        assert!(matches!(
            p.generate(KEY_ID, &ctx()).await,
            Err(EnvelopeError::AccessDenied(ref m)) if m.starts_with("GenerateDataKey")
        ));
    }

    #[tokio::test]
    async fn unwrap_returns_plaintext() {
        let body = format!(
            r#"{{"KeyId":"{KEY_ID}","Plaintext":"{}"}}"#,
            base64::encode([3u8; 32])
        );
        let p = provider(vec![kms_response(200, body)]);
        let key = p.unwrap(KEY_ID, &[1, 2, 3], &ctx()).await.unwrap();
        assert_eq!(key.as_bytes(), &[3u8; 32]);
    }

    #[tokio::test]
    async fn unwrap_with_short_plaintext_is_unavailable() {
        let body = format!(r#"{{"KeyId":"{KEY_ID}","Plaintext":"{}"}}"#, base64::encode([3u8; 8]));
        let p = provider(vec![kms_response(200, body)]);
        assert!(matches!(
            p.unwrap(KEY_ID, &[1, 2, 3], &ctx()).await,
            Err(EnvelopeError::KeyServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn unwrap_without_plaintext_is_reported() {
        let p = provider(vec![kms_response(200, format!(r#"{{"KeyId":"{KEY_ID}"}}"#))]);
        assert!(matches!(
            p.unwrap(KEY_ID, &[1, 2, 3], &ctx()).await,
            Err(EnvelopeError::KeyServiceUnavailable(ref m)) if m.contains("no plaintext")
        ));
    }

    #[tokio::test]
    async fn unwrap_under_wrong_master_key_is_invalid() {
        for code in ["IncorrectKeyException", "InvalidCiphertextException"] {
            let p = provider(vec![kms_error(code)]);
            assert!(matches!(
                p.unwrap(KEY_ID, &[1, 2, 3], &ctx()).await,
                Err(EnvelopeError::InvalidWrappedKey(ref m)) if m.starts_with("Decrypt")
            ));
        }
    }

    #[tokio::test]
    async fn disabled_key_is_unavailable() {
        let p = provider(vec![kms_error("DisabledException")]);
        assert!(matches!(
            p.unwrap(KEY_ID, &[1, 2, 3], &ctx()).await,
            Err(EnvelopeError::KeyServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn dispatch_failure_is_unavailable() {
        // No canned response: the HTTP client fails before reaching KMS.
        let p = provider(Vec::new());
        let err = p.generate(KEY_ID, &ctx()).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::KeyServiceUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn access_denied_code() {
        let e = classify_kms_code(Some("AccessDeniedException"), "Decrypt: denied".into());
        assert!(matches!(e, EnvelopeError::AccessDenied(ref m) if m.contains("denied")));
    }

    #[test]
    fn service_state_codes_map_to_unavailable() {
        for code in ["NotFoundException", "DisabledException", "KMSInvalidStateException"] {
            assert!(matches!(
                classify_kms_code(Some(code), String::new()),
                EnvelopeError::KeyServiceUnavailable(_)
            ));
        }
    }
}
