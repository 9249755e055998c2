//! Master keys: the transport seam to the key-management service and the
//! provider that fans a data key out across every configured key.

pub mod provider;

pub use provider::MasterKeyProvider;

use std::sync::Arc;

use async_trait::async_trait;
use common::{CodecError, EncryptionContext};

/// One data key wrapped under one master key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    /// Master key identifier used for wrapping.
    pub key_id: String,
    /// Opaque ciphertext returned by the key-management service.
    pub ciphertext: Vec<u8>,
}

impl WrappedKey {
    pub fn new(key_id: impl Into<String>, ciphertext: Vec<u8>) -> Self {
        Self {
            key_id: key_id.into(),
            ciphertext,
        }
    }
}

/// Wrap/unwrap primitive of an external key-management service.
///
/// Credentials and region are bound into the implementation at construction.
/// Both calls may block on the network; callers must not hold locks across
/// them. Failures are reported as [`CodecError::KeyAccess`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyTransport: Send + Sync {
    /// Encrypt `raw_key` under the master key `key_id`.
    async fn wrap_key(
        &self,
        key_id: &str,
        raw_key: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, CodecError>;

    /// Decrypt `wrapped` with the master key `key_id`.
    async fn unwrap_key(
        &self,
        key_id: &str,
        wrapped: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, CodecError>;
}

#[async_trait]
impl<T> KeyTransport for Arc<T>
where
    T: KeyTransport + ?Sized,
{
    async fn wrap_key(
        &self,
        key_id: &str,
        raw_key: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, CodecError> {
        (**self).wrap_key(key_id, raw_key, context).await
    }

    async fn unwrap_key(
        &self,
        key_id: &str,
        wrapped: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, CodecError> {
        (**self).unwrap_key(key_id, wrapped, context).await
    }
}
