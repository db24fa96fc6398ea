//! Common types shared across `s3-envelope` crates: the error taxonomy and the
//! object metadata layout that makes an encrypted object self-describing.

pub mod error;
pub mod protocol;

pub use error::EnvelopeError;
pub use protocol::{ContentAlgorithm, EncryptionContext, EnvelopeMetadata, WrapAlgorithm};
