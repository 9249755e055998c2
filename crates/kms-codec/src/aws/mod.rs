//! AWS credential resolution and the KMS-backed key transport.
//!
//! Credentials are resolved once per codec instance from exactly one of three
//! strategies (static keys, named profile, default chain). The resulting
//! [`CredentialHandle`] is folded into the SDK configuration used to build the
//! [`KmsTransport`]; nothing here performs network I/O until the first
//! wrap/unwrap call.

pub mod credentials;
pub mod kms;

pub use credentials::{CredentialHandle, CredentialStrategy};
pub use kms::KmsTransport;
