//! Envelope sealing and opening.
//!
//! This module is free of AWS and network dependencies. It turns a plaintext
//! and a [`DataKey`](crate::keys::DataKey) into an [`Envelope`] and back.
//!
//! # Object layout
//!
//! ```text
//! body      = ciphertext || tag(16)
//! metadata  = wrapped key, nonce, encryption context, algorithm ids
//! ```

pub mod cipher;
pub mod envelope;

pub use cipher::{open, seal, KEY_LEN};
pub use envelope::Envelope;
