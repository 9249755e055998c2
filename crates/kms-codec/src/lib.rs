//! `kms-codec` — envelope-encryption codec for pipeline events.
//!
//! Outbound, an [`Event`] is serialised by the configured inner codec, sealed
//! under a per-message key derived from a KMS-wrapped data key, and packed
//! into a self-describing [`crypto::EnvelopeBlob`]. Inbound, the blob's
//! wrapped keys are unwrapped through KMS, its encryption context is checked
//! against the configured one, and the plaintext is handed back to the inner
//! codec.
//!
//! Layering, leaves first:
//!
//! 1. [`aws`]: credential resolution and the KMS [`keys::KeyTransport`].
//! 2. [`keys`]: the [`keys::MasterKeyProvider`] over an ordered key list.
//! 3. [`materials`]: data-key cache and the crypto materials manager.
//! 4. [`crypto`]: blob format and AEAD sealing.
//! 5. [`inner`]: `plain` / `line` / `json` inner codecs and charsets.
//! 6. [`codec`]: the public [`EnvelopeCodec`].
//!
//! # Security invariants
//!
//! - Raw data keys and static credentials never reach logs or `Debug` output.
//! - Context mismatches are never masked by the passthrough fallback.

pub mod aws;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod inner;
pub mod keys;
pub mod materials;

pub use codec::{EnvelopeCodec, SharedCodec};
pub use common::{CodecError, EncryptionContext, Event};
pub use config::CodecSettings;
pub use inner::{DecodedEvents, InnerCodecKind};
