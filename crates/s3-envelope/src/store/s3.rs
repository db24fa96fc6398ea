//! [`S3ObjectStore`]: objects in a single S3 bucket.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::error::display::DisplayErrorContext;
use bytes::Bytes;
use common::EnvelopeError;
use tracing::debug;

use super::{ObjectStore, StoredObject};

/// [`ObjectStore`] backed by S3 `PutObject` / `GetObject`.
///
/// Metadata entries are sent as user metadata (`x-amz-meta-*`). S3 returns
/// them lower-cased.
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        object_key: &str,
        body: Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<(), EnvelopeError> {
        let len = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .body(ByteStream::from(body))
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| {
                EnvelopeError::StorageUnavailable(format!(
                    "PutObject s3://{}/{object_key}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!(bucket = %self.bucket, object_key, bytes = len, "object uploaded");
        Ok(())
    }

    async fn get(&self, object_key: &str) -> Result<StoredObject, EnvelopeError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    EnvelopeError::NotFound(object_key.to_owned())
                } else {
                    EnvelopeError::StorageUnavailable(format!(
                        "GetObject s3://{}/{object_key}: {}",
                        self.bucket,
                        DisplayErrorContext(&e)
                    ))
                }
            })?;

        let metadata = resp.metadata().cloned().unwrap_or_default();
        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| {
                EnvelopeError::StorageUnavailable(format!(
                    "failed to read body of s3://{}/{object_key}: {e}",
                    self.bucket
                ))
            })?
            .into_bytes();

        debug!(bucket = %self.bucket, object_key, bytes = body.len(), "object downloaded");
        Ok(StoredObject { body, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::retry::RetryConfig;
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
    use aws_smithy_http_client::test_util::{ReplayEvent, StaticReplayClient};
    use aws_smithy_types::body::SdkBody;

    fn s3_response(response: http::Response<SdkBody>) -> ReplayEvent {
        ReplayEvent::new(
            http::Request::builder()
                .uri("https://envelope-test.s3.us-east-1.amazonaws.com/go.txt")
                .body(SdkBody::empty())
                .unwrap(),
            response,
        )
    }

    fn s3_error(status: u16, code: &str) -> ReplayEvent {
        s3_response(
            http::Response::builder()
                .status(status)
                .header("content-type", "application/xml")
                .body(SdkBody::from(format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                     <Error><Code>{code}</Code><Message>{code} raised</Message>\
                     <RequestId>req</RequestId></Error>"
                )))
                .unwrap(),
        )
    }

    fn store(events: Vec<ReplayEvent>) -> S3ObjectStore {
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKID", "SECRET", None, None, "test"))
            .retry_config(RetryConfig::disabled())
            .http_client(StaticReplayClient::new(events))
            .build();
        S3ObjectStore::new(aws_sdk_s3::Client::from_conf(conf), "envelope-test")
    }

    #[tokio::test]
    async fn get_returns_body_and_user_metadata() {
        let s = store(vec![s3_response(
            http::Response::builder()
                .status(200)
                .header("x-amz-meta-x-amz-wrap-alg", "kms+context")
                .header("content-length", "5")
                .body(SdkBody::from("hello"))
                .unwrap(),
        )]);
        let object = s.get("go.txt").await.unwrap();
        assert_eq!(&object.body[..], b"hello");
        assert_eq!(object.metadata["x-amz-wrap-alg"], "kms+context");
    }

    #[tokio::test]
    async fn no_such_key_is_not_found() {
        let s = store(vec![s3_error(404, "NoSuchKey")]);
        assert!(matches!(
            s.get("go.txt").await,
            Err(EnvelopeError::NotFound(ref k)) if k == "go.txt"
        ));
    }

    #[tokio::test]
    async fn access_denied_is_storage_unavailable() {
        let s = store(vec![s3_error(403, "AccessDenied")]);
        assert!(matches!(
            s.get("go.txt").await,
            Err(EnvelopeError::StorageUnavailable(ref m)) if m.contains("s3://envelope-test/go.txt")
        ));
    }

    #[tokio::test]
    async fn put_dispatch_failure_is_retryable() {
        let s = store(Vec::new());
        let err = s
            .put("go.txt", Bytes::from_static(b"x"), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::StorageUnavailable(_)));
        assert!(err.is_retryable());
    }
}
