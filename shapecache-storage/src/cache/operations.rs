//! Name-based cache operations for application code.
//!
//! [`CacheOperations`] resolves a cache by name on every call, so callers
//! only carry the manager handle. An unknown cache (dynamic creation off)
//! behaves as an empty cache that accepts no writes.

use std::sync::Arc;

use shapecache_core::{CacheResult, Cacheable};

use super::key::CacheKey;
use super::manager::CacheManager;
use super::traits::CacheExt;

/// Typed helpers over a [`CacheManager`].
#[derive(Debug, Clone)]
pub struct CacheOperations {
    manager: Arc<CacheManager>,
}

impl CacheOperations {
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    /// Value of type `T` at `key` in `cache_name`.
    pub async fn lookup<T: Cacheable>(
        &self,
        cache_name: &str,
        key: &CacheKey,
    ) -> CacheResult<Option<T>> {
        match self.manager.get_cache(cache_name) {
            Some(cache) => cache.get::<T>(key).await,
            None => Ok(None),
        }
    }

    /// Store `value` at `key`. Returns `false` when the cache does not exist.
    pub async fn store<T: Cacheable>(
        &self,
        cache_name: &str,
        key: &CacheKey,
        value: &T,
    ) -> CacheResult<bool> {
        let Some(cache) = self.manager.get_cache(cache_name) else {
            return Ok(false);
        };
        cache.put(key, value).await?;
        Ok(true)
    }

    /// Evict `key`. Returns `false` when the cache does not exist.
    pub async fn invalidate(&self, cache_name: &str, key: &CacheKey) -> CacheResult<bool> {
        let Some(cache) = self.manager.get_cache(cache_name) else {
            return Ok(false);
        };
        cache.evict(key).await?;
        Ok(true)
    }

    /// Clear every entry of `cache_name`. Returns how many were removed.
    pub async fn invalidate_all(&self, cache_name: &str) -> CacheResult<u64> {
        match self.manager.get_cache(cache_name) {
            Some(cache) => cache.clear().await,
            None => Ok(0),
        }
    }

    /// Like [`lookup`](Self::lookup), but a poisoned entry is evicted and
    /// reported as a miss.
    ///
    /// Store failures still propagate, including a failure of the eviction.
    pub async fn lookup_or_evict<T: Cacheable>(
        &self,
        cache_name: &str,
        key: &CacheKey,
    ) -> CacheResult<Option<T>> {
        let Some(cache) = self.manager.get_cache(cache_name) else {
            return Ok(None);
        };

        match cache.get::<T>(key).await {
            Err(e) if e.is_poisoned_entry() => {
                tracing::info!(
                    cache = cache_name,
                    type_name = T::TYPE_NAME,
                    reason = %e,
                    "Evicting incompatible cache entry"
                );
                cache.evict(key).await?;
                Ok(None)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde::{Deserialize, Serialize};
    use shapecache_core::{
        CacheError, CacheSettings, CodecError, FingerprintRegistry, TypeShape,
    };
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Price {
        cents: i64,
    }

    impl Cacheable for Price {
        const TYPE_NAME: &'static str = "test.Price";

        fn shape() -> TypeShape {
            TypeShape::structure().field("cents", "i64")
        }
    }

    fn operations(store: Arc<InMemoryStore>, settings: CacheSettings) -> CacheOperations {
        let manager = CacheManager::builder(store)
            .settings(settings)
            .fingerprints(Arc::new(FingerprintRegistry::new()))
            .build()
            .unwrap();
        CacheOperations::new(Arc::new(manager))
    }

    #[tokio::test]
    async fn test_store_and_lookup() {
        let ops = operations(Arc::new(InMemoryStore::new()), CacheSettings::default());
        let key = CacheKey::from("sku-1");

        assert!(ops.store("prices", &key, &Price { cents: 99 }).await.unwrap());
        let price: Option<Price> = ops.lookup("prices", &key).await.unwrap();
        assert_eq!(price, Some(Price { cents: 99 }));

        assert!(ops.invalidate("prices", &key).await.unwrap());
        assert!(ops.lookup::<Price>("prices", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_cache_is_empty() {
        let settings = CacheSettings::new().with_dynamic(false);
        let ops = operations(Arc::new(InMemoryStore::new()), settings);
        let key = CacheKey::from("sku-1");

        assert!(!ops.store("prices", &key, &Price { cents: 1 }).await.unwrap());
        assert!(ops.lookup::<Price>("prices", &key).await.unwrap().is_none());
        assert!(!ops.invalidate("prices", &key).await.unwrap());
        assert_eq!(ops.invalidate_all("prices").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let ops = operations(Arc::new(InMemoryStore::new()), CacheSettings::default());
        for i in 0..3u64 {
            ops.store("prices", &CacheKey::from(i), &Price { cents: 1 })
                .await
                .unwrap();
        }
        ops.store("other", &CacheKey::from(0u64), &Price { cents: 1 })
            .await
            .unwrap();

        assert_eq!(ops.invalidate_all("prices").await.unwrap(), 3);
        assert!(ops
            .lookup::<Price>("other", &CacheKey::from(0u64))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_lookup_or_evict_drops_poisoned_entry() {
        let store = Arc::new(InMemoryStore::new());
        let ops = operations(store.clone(), CacheSettings::default());
        store.insert_raw(
            &b"prices:\"sku-1\""[..],
            &br#"["test.Price%7",{"cents":5}]"#[..],
            Duration::from_secs(60),
        );
        let key = CacheKey::from("sku-1");

        let err = ops.lookup::<Price>("prices", &key).await.unwrap_err();
        assert!(matches!(err, CacheError::Codec(CodecError::VersionMismatch { .. })));

        assert!(ops.lookup_or_evict::<Price>("prices", &key).await.unwrap().is_none());
        assert!(!store.contains(b"prices:\"sku-1\""));
    }
}
