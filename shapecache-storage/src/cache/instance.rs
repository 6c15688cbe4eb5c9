//! The concrete cache bound to a remote store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shapecache_core::{CacheError, CacheResult, ValueCodec};

use super::key::{CacheKey, KeyCodec};
use super::traits::{Cache, Capabilities, StatsRecorder};
use crate::store::RemoteStore;

/// A named cache: key prefix, TTL, codec, and a handle to the shared store.
pub struct CacheInstance {
    name: String,
    keys: KeyCodec,
    time_to_live: Duration,
    codec: Arc<ValueCodec>,
    store: Arc<dyn RemoteStore>,
    stats: StatsRecorder,
}

impl CacheInstance {
    pub fn new(
        name: impl Into<String>,
        keys: KeyCodec,
        time_to_live: Duration,
        codec: Arc<ValueCodec>,
        store: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            name: name.into(),
            keys,
            time_to_live,
            codec,
            store,
            stats: StatsRecorder::default(),
        }
    }

    pub fn key_codec(&self) -> &KeyCodec {
        &self.keys
    }
}

impl std::fmt::Debug for CacheInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInstance")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .field("time_to_live", &self.time_to_live)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Cache for CacheInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_to_live(&self) -> Duration {
        self.time_to_live
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    fn recorder(&self) -> &StatsRecorder {
        &self.stats
    }

    async fn get_encoded(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        let physical = self.keys.physical_key(key);
        let value = self.store.get(&physical).await?;

        match &value {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        tracing::trace!(
            cache = %self.name,
            key = %hex::encode(&physical),
            hit = value.is_some(),
            "Cache lookup"
        );

        Ok(value)
    }

    async fn put_encoded(&self, key: &CacheKey, value: Vec<u8>) -> CacheResult<()> {
        let physical = self.keys.physical_key(key);
        self.store
            .set_with_ttl(&physical, &value, self.time_to_live)
            .await?;
        self.stats.record_put();

        tracing::trace!(
            cache = %self.name,
            key = %hex::encode(&physical),
            bytes = value.len(),
            ttl_secs = self.time_to_live.as_secs(),
            "Cache write"
        );
        Ok(())
    }

    async fn evict(&self, key: &CacheKey) -> CacheResult<()> {
        let physical = self.keys.physical_key(key);
        if self.store.delete(&physical).await? {
            self.stats.record_evictions(1);
        }
        Ok(())
    }

    async fn evict_all(&self, keys: &[CacheKey]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let physical = self.keys.physical_keys(keys);
        let deleted = self.store.delete_many(&physical).await?;
        self.stats.record_evictions(deleted);

        tracing::debug!(
            cache = %self.name,
            requested = keys.len(),
            deleted,
            "Evicted keys"
        );
        Ok(deleted)
    }

    async fn clear(&self) -> CacheResult<u64> {
        let Some(prefix) = self.keys.prefix() else {
            tracing::warn!(cache = %self.name, "Refusing to clear a cache without key prefix");
            return Err(CacheError::ScopedClearUnsupported {
                cache_name: self.name.clone(),
            });
        };

        let deleted = self.store.delete_by_prefix(prefix).await?;
        self.stats.record_evictions(deleted);

        tracing::info!(cache = %self.name, deleted, "Cache cleared");
        Ok(deleted)
    }
}
