//! Crypto materials: negotiated data keys, their cache, and the manager that
//! decides between reuse and renegotiation.
//!
//! # Lifecycle
//!
//! 1. On an encrypt request, [`CryptoMaterialsManager`] looks the context up
//!    in the [`MaterialsCache`].
//! 2. On a miss it generates a fresh data key, wraps it under every master
//!    key, and caches the resulting [`CryptoMaterial`].
//! 3. Entries expire by age, by use count, or by LRU capacity pressure.
//! 4. Decrypt requests always unwrap from the blob and are never cached.

pub mod cache;
pub mod manager;

pub use cache::{CacheKey, CacheLimits, CacheStats, MaterialsCache};
pub use manager::{CryptoMaterialsManager, DecryptionMaterial};

use common::EncryptionContext;

use crate::crypto::DataKey;
use crate::keys::WrappedKey;

/// A negotiated data key with its wrapped forms.
///
/// Shared read-only between concurrent requests; never mutated in place.
#[derive(Debug)]
pub struct CryptoMaterial {
    pub data_key: DataKey,
    pub wrapped_keys: Vec<WrappedKey>,
    /// Context the data key was negotiated under.
    pub context: EncryptionContext,
}
