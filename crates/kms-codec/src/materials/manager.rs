//! [`CryptoMaterialsManager`]: cache-or-negotiate for encryption, unwrap for decryption.

use std::sync::Arc;

use common::{CodecError, EncryptionContext};
use tracing::debug;

use super::{CacheKey, CacheStats, CryptoMaterial, MaterialsCache};
use crate::crypto::DataKey;
use crate::keys::{KeyTransport, MasterKeyProvider, WrappedKey};

/// Key material recovered from a blob.
#[derive(Debug)]
pub struct DecryptionMaterial {
    pub data_key: DataKey,
    /// Context declared by the blob; not validated here.
    pub context: EncryptionContext,
}

/// Composes a [`MasterKeyProvider`] with a [`MaterialsCache`].
#[derive(Debug)]
pub struct CryptoMaterialsManager<T> {
    provider: MasterKeyProvider<T>,
    cache: MaterialsCache,
}

impl<T: KeyTransport> CryptoMaterialsManager<T> {
    pub fn new(provider: MasterKeyProvider<T>, cache: MaterialsCache) -> Self {
        Self { provider, cache }
    }

    pub fn provider(&self) -> &MasterKeyProvider<T> {
        &self.provider
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of data keys currently cached.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Reuse cached material for `context`, or negotiate and cache a new data key.
    ///
    /// The cache lock is released before the provider is called; concurrent
    /// misses for one context each negotiate, and the last insert wins.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::KeyAccess`] if wrapping fails under any master key.
    pub async fn materials_for_encrypt(
        &self,
        context: &EncryptionContext,
    ) -> Result<Arc<CryptoMaterial>, CodecError> {
        let key = CacheKey::derive(self.provider.identity(), context);
        if let Some(material) = self.cache.get(&key) {
            debug!("data key cache hit");
            return Ok(material);
        }

        debug!("data key cache miss; negotiating");
        let data_key = DataKey::generate();
        let wrapped_keys = self.provider.wrap(&data_key, context).await?;
        let material = Arc::new(CryptoMaterial {
            data_key,
            wrapped_keys,
            context: context.clone(),
        });
        self.cache.insert(key, Arc::clone(&material));
        Ok(material)
    }

    /// Unwrap the data key of a blob. Never cached.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::KeyAccess`] if no wrapped key can be unwrapped.
    pub async fn materials_for_decrypt(
        &self,
        wrapped_keys: &[WrappedKey],
        context: &EncryptionContext,
    ) -> Result<DecryptionMaterial, CodecError> {
        let data_key = self.provider.unwrap(wrapped_keys, context).await?;
        Ok(DecryptionMaterial {
            data_key,
            context: context.clone(),
        })
    }
}
