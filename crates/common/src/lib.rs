//! Common types and errors shared across `kms-codec` crates.

pub mod error;
pub mod protocol;

pub use error::CodecError;
pub use protocol::{EncryptionContext, Event};
