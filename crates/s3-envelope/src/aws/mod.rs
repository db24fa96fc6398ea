//! AWS SDK client initialisation for KMS and S3.
//!
//! Region, profile, endpoint override and per-operation deadlines all come
//! from [`Config`](crate::config::Config); credentials come from the standard
//! AWS credential chain.

pub mod clients;

pub use clients::AwsClients;
