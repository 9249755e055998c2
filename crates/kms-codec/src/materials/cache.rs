//! [`MaterialsCache`]: bounded, age- and use-limited LRU of data keys.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{CodecError, EncryptionContext};
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::CryptoMaterial;

/// Eviction bounds for [`MaterialsCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    max_entries: NonZeroUsize,
    max_entry_age: Duration,
    max_entry_uses: u64,
}

impl CacheLimits {
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if any bound is zero.
    pub fn new(
        max_entries: usize,
        max_entry_age: Duration,
        max_entry_uses: u64,
    ) -> Result<Self, CodecError> {
        let max_entries = NonZeroUsize::new(max_entries).ok_or_else(|| {
            CodecError::Configuration("max_cache_entries must be > 0".into())
        })?;
        if max_entry_age.is_zero() {
            return Err(CodecError::Configuration("max_entry_age must be > 0".into()));
        }
        if max_entry_uses == 0 {
            return Err(CodecError::Configuration("max_entry_uses must be > 0".into()));
        }
        Ok(Self {
            max_entries,
            max_entry_age,
            max_entry_uses,
        })
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries.get()
    }

    pub fn max_entry_age(&self) -> Duration {
        self.max_entry_age
    }

    pub fn max_entry_uses(&self) -> u64 {
        self.max_entry_uses
    }
}

/// SHA-256 over the provider identity and the canonical context encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn derive(provider_identity: &str, context: &EncryptionContext) -> Self {
        let mut hasher = Sha256::new();
        update_framed(&mut hasher, provider_identity.as_bytes());
        hasher.update((context.len() as u64).to_be_bytes());
        for (key, value) in context.iter() {
            update_framed(&mut hasher, key.as_bytes());
            update_framed(&mut hasher, value.as_bytes());
        }
        Self(hasher.finalize().into())
    }
}

// Length-prefix every field so ("ab","c") and ("a","bc") hash differently.
fn update_framed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

struct CacheEntry {
    material: Arc<CryptoMaterial>,
    created_at: Instant,
    use_count: u64,
}

impl CacheEntry {
    fn is_usable(&self, now: Instant, limits: &CacheLimits) -> bool {
        self.use_count < limits.max_entry_uses
            && now.saturating_duration_since(self.created_at) <= limits.max_entry_age
    }
}

/// Point-in-time counters for a [`MaterialsCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Thread-safe data-key cache.
///
/// One mutex guards the LRU map; it is held only for the lookup-and-touch or
/// insert-and-evict bookkeeping, never across a key-management call.
pub struct MaterialsCache {
    limits: CacheLimits,
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
    counters: Counters,
}

impl MaterialsCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            limits,
            inner: Mutex::new(LruCache::new(limits.max_entries)),
            counters: Counters::default(),
        }
    }

    pub fn limits(&self) -> &CacheLimits {
        &self.limits
    }

    /// Fetch a usable entry and count one use against it.
    ///
    /// Entries past their age or use limit are removed and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CryptoMaterial>> {
        self.get_at(key, Instant::now())
    }

    /// Insert freshly negotiated material; the negotiating request is its first use.
    pub fn insert(&self, key: CacheKey, material: Arc<CryptoMaterial>) {
        self.insert_at(key, material, Instant::now());
    }

    pub(crate) fn get_at(&self, key: &CacheKey, now: Instant) -> Option<Arc<CryptoMaterial>> {
        let mut inner = self.inner.lock();

        let hit = match inner.get_mut(key) {
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) if entry.is_usable(now, &self.limits) => {
                entry.use_count += 1;
                Some(Arc::clone(&entry.material))
            }
            Some(_) => None,
        };

        match hit {
            Some(material) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(material)
            }
            None => {
                inner.pop(key);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("cached data key expired");
                None
            }
        }
    }

    pub(crate) fn insert_at(&self, key: CacheKey, material: Arc<CryptoMaterial>, now: Instant) {
        let entry = CacheEntry {
            material,
            created_at: now,
            use_count: 1,
        };
        let displaced = self.inner.lock().push(key, entry);
        if let Some((old_key, _)) = displaced {
            if old_key != key {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("least recently used data key evicted");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.limits.max_entries()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for MaterialsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialsCache")
            .field("limits", &self.limits)
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DataKey;
    use crate::keys::WrappedKey;

    fn limits(entries: usize, age_ms: u64, uses: u64) -> CacheLimits {
        CacheLimits::new(entries, Duration::from_millis(age_ms), uses).unwrap()
    }

    fn material(ctx: &EncryptionContext) -> Arc<CryptoMaterial> {
        Arc::new(CryptoMaterial {
            data_key: DataKey::generate(),
            wrapped_keys: vec![WrappedKey::new("k1", vec![1])],
            context: ctx.clone(),
        })
    }

    fn ctx(tenant: &str) -> EncryptionContext {
        [("tenant", tenant)].into_iter().collect()
    }

    #[test]
    fn limits_reject_zero() {
        assert!(CacheLimits::new(0, Duration::from_secs(1), 1).is_err());
        assert!(CacheLimits::new(1, Duration::ZERO, 1).is_err());
        assert!(CacheLimits::new(1, Duration::from_secs(1), 0).is_err());
    }

    #[test]
    fn key_depends_on_identity_and_context() {
        let a = CacheKey::derive("aws-kms:us-east-1:k1", &ctx("acme"));
        assert_eq!(a, CacheKey::derive("aws-kms:us-east-1:k1", &ctx("acme")));
        assert_ne!(a, CacheKey::derive("aws-kms:us-east-1:k2", &ctx("acme")));
        assert_ne!(a, CacheKey::derive("aws-kms:us-east-1:k1", &ctx("globex")));
    }

    #[test]
    fn key_framing_prevents_concatenation_collisions() {
        let a: EncryptionContext = [("ab", "c")].into_iter().collect();
        let b: EncryptionContext = [("a", "bc")].into_iter().collect();
        assert_ne!(CacheKey::derive("p", &a), CacheKey::derive("p", &b));
    }

    #[test]
    fn hit_and_miss() {
        let cache = MaterialsCache::new(limits(4, 60_000, 100));
        let key = CacheKey::derive("p", &ctx("acme"));
        assert!(cache.get(&key).is_none());
        let m = material(&ctx("acme"));
        cache.insert(key, m.clone());
        let hit = cache.get(&key).expect("cache hit");
        assert!(Arc::ptr_eq(&hit, &m));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, evictions: 0 });
    }

    #[test]
    fn age_expiry() {
        let cache = MaterialsCache::new(limits(4, 10, 100));
        let key = CacheKey::derive("p", &ctx("acme"));
        let now = Instant::now();
        cache.insert_at(key, material(&ctx("acme")), now);
        assert!(cache.get_at(&key, now + Duration::from_millis(10)).is_some());
        assert!(cache.get_at(&key, now + Duration::from_millis(11)).is_none());
        assert!(!cache.contains(&key), "expired entry is removed");
    }

    #[test]
    fn use_count_expiry_counts_the_insert() {
        let cache = MaterialsCache::new(limits(4, 60_000, 3));
        let key = CacheKey::derive("p", &ctx("acme"));
        cache.insert(key, material(&ctx("acme")));
        // Insert was use 1; two retrievals bring it to 3.
        assert!(cache.get(&key).is_some());
        assert!(cache.get(&key).is_some());
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = MaterialsCache::new(limits(2, 60_000, 100));
        let (ka, kb, kc) = (
            CacheKey::derive("p", &ctx("a")),
            CacheKey::derive("p", &ctx("b")),
            CacheKey::derive("p", &ctx("c")),
        );
        cache.insert(ka, material(&ctx("a")));
        cache.insert(kb, material(&ctx("b")));
        // Touch `a` so `b` becomes least recently used.
        assert!(cache.get(&ka).is_some());
        cache.insert(kc, material(&ctx("c")));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&ka));
        assert!(!cache.contains(&kb));
        assert!(cache.contains(&kc));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn reinsert_same_key_is_not_an_eviction() {
        let cache = MaterialsCache::new(limits(2, 60_000, 100));
        let key = CacheKey::derive("p", &ctx("a"));
        cache.insert(key, material(&ctx("a")));
        cache.insert(key, material(&ctx("a")));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn use_limit_is_exact_under_concurrency() {
        const USES: u64 = 50;
        let cache = Arc::new(MaterialsCache::new(limits(4, 60_000, USES)));
        let key = CacheKey::derive("p", &ctx("acme"));
        cache.insert(key, material(&ctx("acme")));

        let hits = Arc::new(AtomicU64::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let hits = Arc::clone(&hits);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        if cache.get(&key).is_some() {
                            hits.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // The insert counted as the first use.
        assert_eq!(hits.load(Ordering::SeqCst), USES - 1);
    }
}
