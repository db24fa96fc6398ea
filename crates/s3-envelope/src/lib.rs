//! Client-side envelope encryption for S3 objects.
//!
//! Objects are encrypted locally under a fresh per-object data key minted by
//! AWS KMS, and the KMS-wrapped data key travels with the object as user
//! metadata. Decryption needs nothing but the stored object and access to the
//! master key.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use s3_envelope::{config::Config, EncryptionClient};
//!
//! let cfg = Config::from_env()?;
//! let client = EncryptionClient::from_config(&cfg).await;
//! client.put("go.txt", b"hello from go!").await?;
//! assert_eq!(client.get("go.txt").await?, b"hello from go!");
//! # Ok(())
//! # }
//! ```

pub mod aws;
pub mod client;
pub mod config;
pub mod crypto;
pub mod keys;
pub mod store;
pub mod telemetry;

pub use client::EncryptionClient;
pub use common::{ContentAlgorithm, EnvelopeError};
