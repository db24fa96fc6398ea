//! Configuration loading and validation.
//!
//! All values are read from environment variables. Bucket, master key and
//! region have no defaults; the process exits with a clear error message if
//! any of them is missing.

use anyhow::{Context, Result};
use common::ContentAlgorithm;
use serde::Deserialize;

/// Validated client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bucket objects are stored in. **Required.**
    pub s3_bucket: String,

    /// KMS key id, ARN or alias that wraps every data key. **Required.**
    pub kms_key_id: String,

    /// AWS region for both S3 and KMS. **Required.**
    pub aws_region: String,

    /// Shared-config profile to resolve credentials from. When unset, the
    /// standard AWS credential chain applies.
    #[serde(default)]
    pub aws_profile: Option<String>,

    /// Endpoint override for both services (e.g. a local S3/KMS emulator).
    #[serde(default)]
    pub aws_endpoint_url: Option<String>,

    /// Content algorithm used for new objects.
    #[serde(default)]
    pub content_algorithm: ContentAlgorithm,

    /// Deadline (seconds) applied to every KMS and S3 call.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
}

fn default_operation_timeout() -> u64 {
    30
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.s3_bucket, "S3_BUCKET")?;
        ensure_non_empty(&self.kms_key_id, "KMS_KEY_ID")?;
        ensure_non_empty(&self.aws_region, "AWS_REGION")?;
        if let Some(profile) = &self.aws_profile {
            ensure_non_empty(profile, "AWS_PROFILE")?;
        }
        if let Some(url) = &self.aws_endpoint_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("AWS_ENDPOINT_URL must be an http(s) URL");
            }
        }
        if self.operation_timeout_secs == 0 {
            anyhow::bail!("OPERATION_TIMEOUT_SECS must be > 0");
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
