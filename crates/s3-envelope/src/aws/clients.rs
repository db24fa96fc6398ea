//! AWS SDK client bundle.

use std::time::Duration;

use aws_config::{BehaviorVersion, Region};
use aws_smithy_types::timeout::TimeoutConfig;
use tracing::info;

use crate::config::Config;

/// Bundle of AWS SDK clients sharing one [`aws_config::SdkConfig`], so that
/// credentials are resolved once and reused.
#[derive(Clone, Debug)]
pub struct AwsClients {
    /// KMS client used to mint and unwrap data keys.
    pub kms: aws_sdk_kms::Client,
    /// S3 client used to store and fetch encrypted objects.
    pub s3: aws_sdk_s3::Client,
}

impl AwsClients {
    /// Initialise all AWS SDK clients from `cfg`.
    ///
    /// Every call made through these clients is bounded by
    /// `cfg.operation_timeout_secs`. When an endpoint override is set, S3 is
    /// switched to path-style addressing, which local emulators expect.
    pub async fn init(cfg: &Config) -> Self {
        let timeout = Duration::from_secs(cfg.operation_timeout_secs);

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.aws_region.clone()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .build(),
            );
        if let Some(profile) = &cfg.aws_profile {
            loader = loader.profile_name(profile);
        }
        if let Some(url) = &cfg.aws_endpoint_url {
            loader = loader.endpoint_url(url);
        }
        let sdk = loader.load().await;

        let kms = aws_sdk_kms::Client::new(&sdk);
        let s3 = aws_sdk_s3::Client::from_conf(
            aws_sdk_s3::config::Builder::from(&sdk)
                .force_path_style(cfg.aws_endpoint_url.is_some())
                .build(),
        );

        info!(
            region = %cfg.aws_region,
            profile = cfg.aws_profile.as_deref().unwrap_or("<default chain>"),
            endpoint_override = cfg.aws_endpoint_url.is_some(),
            timeout_secs = cfg.operation_timeout_secs,
            "AWS clients initialised"
        );
        Self { kms, s3 }
    }
}
