//! [`MasterKeyProvider`]: wraps one data key under every configured master key
//! and unwraps with whichever key the caller can reach.

use common::{CodecError, EncryptionContext};
use tracing::{debug, warn};

use super::{KeyTransport, WrappedKey};
use crate::crypto::DataKey;

/// Ordered, immutable set of master keys in one region.
///
/// The first key is primary; every key can unwrap.
#[derive(Debug)]
pub struct MasterKeyProvider<T> {
    transport: T,
    region: String,
    key_ids: Vec<String>,
    identity: String,
}

impl<T: KeyTransport> MasterKeyProvider<T> {
    /// Bind `transport` to `region` and a non-empty list of key identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if `key_ids` is empty.
    pub fn new(
        transport: T,
        region: impl Into<String>,
        key_ids: Vec<String>,
    ) -> Result<Self, CodecError> {
        if key_ids.is_empty() {
            return Err(CodecError::Configuration(
                "a master key provider needs at least one key identifier".into(),
            ));
        }
        let region = region.into();
        let identity = format!("aws-kms:{region}:{}", key_ids.join(","));
        Ok(Self {
            transport,
            region,
            key_ids,
            identity,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn key_ids(&self) -> &[String] {
        &self.key_ids
    }

    /// The key that wraps first.
    pub fn primary_key_id(&self) -> &str {
        &self.key_ids[0]
    }

    /// Stable identity string; part of every cache key.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Wrap `data_key` under every configured master key, in order.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::KeyAccess`] as soon as any key fails; no partial
    /// result is returned.
    pub async fn wrap(
        &self,
        data_key: &DataKey,
        context: &EncryptionContext,
    ) -> Result<Vec<WrappedKey>, CodecError> {
        let mut wrapped = Vec::with_capacity(self.key_ids.len());
        for key_id in &self.key_ids {
            let ciphertext = self
                .transport
                .wrap_key(key_id, data_key.as_bytes(), context)
                .await?;
            wrapped.push(WrappedKey::new(key_id.clone(), ciphertext));
        }
        debug!(keys = wrapped.len(), region = %self.region, "data key wrapped");
        Ok(wrapped)
    }

    /// Unwrap the first entry of `wrapped` that the transport accepts.
    ///
    /// Only entries naming one of this provider's key IDs are sent to the
    /// transport; the rest are skipped. Entries are tried in blob order. A
    /// failure on one entry is logged and the next is tried.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::KeyAccess`] carrying the last failure if no entry
    /// unwraps to a valid data key, or naming the primary key if no entry uses
    /// a configured key.
    pub async fn unwrap(
        &self,
        wrapped: &[WrappedKey],
        context: &EncryptionContext,
    ) -> Result<DataKey, CodecError> {
        let mut last_error = None;
        for entry in wrapped {
            if !self.key_ids.contains(&entry.key_id) {
                debug!(key_id = %entry.key_id, "skipping key not configured on this provider");
                continue;
            }
            let attempt = self
                .transport
                .unwrap_key(&entry.key_id, &entry.ciphertext, context)
                .await
                .and_then(|raw| {
                    DataKey::from_slice(&raw)
                        .map_err(|e| CodecError::key_access(&entry.key_id, e))
                });
            match attempt {
                Ok(data_key) => {
                    debug!(key_id = %entry.key_id, "data key unwrapped");
                    return Ok(data_key);
                }
                Err(e) => {
                    warn!(key_id = %entry.key_id, error = %e, "unwrap failed; trying next key");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            CodecError::key_access(
                self.primary_key_id(),
                "blob carries no data key wrapped under a configured master key",
            )
        }))
    }
}
