//! shapecache Storage - Cache Manager and Remote Stores
//!
//! Named, prefixed, TTL-bound caches over a pluggable byte-level
//! [`RemoteStore`], with the versioned codec from `shapecache-core`.

pub mod cache;
pub mod store;

pub use cache::{
    decorate, Cache, CacheExt, CacheInstance, CacheKey, CacheManager, CacheManagerBuilder,
    CacheOperations, CacheStats, CacheTransaction, Capabilities, KeyCodec, StatsRecorder,
    TransactionAwareCache,
};
pub use store::{InMemoryStore, LmdbStore, LmdbStoreError, RemoteStore, RoundTrips, StoreResult};
