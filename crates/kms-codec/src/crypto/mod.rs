//! Envelope blob format and AES-256-GCM-SIV payload sealing.
//!
//! This module is free of AWS and KMS dependencies: it receives raw data keys
//! and already-wrapped key blobs and only frames and authenticates them.
//!
//! # Blob format
//!
//! ```text
//! "KE" | version u8 | algorithm u8 | message id [16]
//!      | u16 pair count  { u16 len, key, u16 len, value }*
//!      | u16 key count   { u16 len, key id, u16 len, wrapped key }+
//!      | nonce [12] | ciphertext + tag
//! ```
//!
//! Everything before the nonce is the AEAD associated data, so the context
//! and the wrapped keys are authenticated together with the payload.

pub mod blob;
pub mod cipher;
pub mod data_key;

pub use blob::EnvelopeBlob;
pub use cipher::{CipherError, KEY_LEN, NONCE_LEN};
pub use data_key::DataKey;
