//! Cache traits and usage statistics.
//!
//! [`Cache`] is the object-safe, byte-level contract every cache and
//! decorator implements. [`CacheExt`] layers the typed `get`/`put` on top
//! through the cache's [`ValueCodec`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bitflags::bitflags;
use shapecache_core::{CacheResult, Cacheable, ValueCodec};

use super::key::CacheKey;

bitflags! {
    /// Decorations applied to a cache.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Writes and evictions are deferred to the surrounding transaction.
        const TRANSACTION_AWARE = 0b0000_0001;
    }
}

/// A named cache over a remote store.
#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    /// TTL applied to every write.
    fn time_to_live(&self) -> Duration;

    fn capabilities(&self) -> Capabilities;

    /// Codec used to encode values.
    fn codec(&self) -> &ValueCodec;

    /// Counters shared by this cache and every decorator around it.
    fn recorder(&self) -> &StatsRecorder;

    fn stats(&self) -> CacheStats {
        self.recorder().snapshot()
    }

    /// Encoded value stored at `key`, if any.
    async fn get_encoded(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>>;

    /// Store encoded bytes at `key` with this cache's TTL.
    async fn put_encoded(&self, key: &CacheKey, value: Vec<u8>) -> CacheResult<()>;

    async fn evict(&self, key: &CacheKey) -> CacheResult<()>;

    /// Evict `keys` in a single store round trip. Returns how many were removed.
    async fn evict_all(&self, keys: &[CacheKey]) -> CacheResult<u64>;

    /// Remove every entry of this cache. Requires key prefixing.
    async fn clear(&self) -> CacheResult<u64>;
}

/// Typed access to a [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    /// Look up and decode the value at `key`.
    ///
    /// An absent entry is `Ok(None)`. An entry written by an incompatible
    /// version of `T` is an error, never a value.
    async fn get<T: Cacheable>(&self, key: &CacheKey) -> CacheResult<Option<T>> {
        let Some(bytes) = self.get_encoded(key).await? else {
            return Ok(None);
        };

        match self.codec().deserialize::<T>(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                self.recorder().record_poisoned();
                tracing::warn!(
                    cache = %self.name(),
                    type_name = T::TYPE_NAME,
                    error = %e,
                    "Cached value rejected"
                );
                Err(e.into())
            }
        }
    }

    /// Encode `value` and store it at `key`.
    async fn put<T: Cacheable>(&self, key: &CacheKey, value: &T) -> CacheResult<()> {
        let bytes = self.codec().serialize(value)?;
        self.put_encoded(key, bytes).await
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of successful writes.
    pub puts: u64,
    /// Number of entries removed by evict, evict_all or clear.
    pub evictions: u64,
    /// Number of reads rejected by the codec.
    pub poisoned: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    evictions: AtomicU64,
    poisoned: AtomicU64,
}

impl StatsRecorder {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_poisoned(&self) {
        self.poisoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            poisoned: self.poisoned.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_recorder_snapshot() {
        let recorder = StatsRecorder::default();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_miss();
        recorder.record_put();
        recorder.record_evictions(4);
        recorder.record_poisoned();

        assert_eq!(
            recorder.snapshot(),
            CacheStats {
                hits: 2,
                misses: 1,
                puts: 1,
                evictions: 4,
                poisoned: 1,
            }
        );
    }

    #[test]
    fn test_capabilities() {
        let caps = Capabilities::empty();
        assert!(!caps.contains(Capabilities::TRANSACTION_AWARE));
        assert!((caps | Capabilities::TRANSACTION_AWARE).contains(Capabilities::TRANSACTION_AWARE));
    }
}
