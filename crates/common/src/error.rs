//! Error taxonomy shared by every codec layer.

use thiserror::Error;

/// Top-level codec error type.
///
/// Every failure of `encode` / `decode` surfaces as one of these variants:
/// - [`CodecError::Configuration`] → raised at setup, never at runtime
/// - [`CodecError::KeyAccess`] → KMS refused or could not wrap/unwrap
/// - [`CodecError::CryptoFormat`] → blob malformed or failed authentication
/// - [`CodecError::ContextMismatch`] → blob context lacks a configured pair
/// - [`CodecError::Serialization`] → the inner codec failed
#[derive(Debug, Error)]
pub enum CodecError {
    /// Settings are invalid: empty key list, non-string context value, unknown charset.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The key-management service denied or failed a wrap/unwrap call.
    #[error("key access error for {key_id}: {reason}")]
    KeyAccess {
        /// Key identifier the failing call targeted.
        key_id: String,
        /// Transport-level description of the failure.
        reason: String,
    },

    /// The payload is not a well-formed envelope, or failed authentication.
    #[error("invalid envelope: {0}")]
    CryptoFormat(String),

    /// A configured encryption-context pair is absent from, or differs in, the blob.
    #[error("encryption context mismatch for key `{key}`")]
    ContextMismatch {
        /// The configured context key that failed the check.
        key: String,
        /// The configured value.
        expected: String,
        /// The value declared by the blob, if the key was present at all.
        actual: Option<String>,
    },

    /// The wrapped inner codec could not serialise or parse an event.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CodecError {
    /// Build a [`CodecError::KeyAccess`] for `key_id`.
    pub fn key_access(key_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        CodecError::KeyAccess {
            key_id: key_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the opt-in passthrough fallback may recover this error.
    ///
    /// Only malformed or unauthenticated payloads qualify; context mismatches
    /// and key-access failures always propagate.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, CodecError::CryptoFormat(_))
    }

    /// Short machine-readable error kind, suitable as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            CodecError::Configuration(_) => "configuration",
            CodecError::KeyAccess { .. } => "key_access",
            CodecError::CryptoFormat(_) => "crypto_format",
            CodecError::ContextMismatch { .. } => "context_mismatch",
            CodecError::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Serialization(e.to_string())
    }
}
