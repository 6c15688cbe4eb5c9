//! Remote-store contract.
//!
//! The cache layer talks to its backing key-value store only through
//! [`RemoteStore`]: byte keys, byte values, per-write TTL. The transport,
//! connection pooling and timeouts belong to the implementation; errors it
//! reports are propagated to cache callers unchanged.

pub mod lmdb_backend;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use shapecache_core::StoreError;

pub use lmdb_backend::{LmdbStore, LmdbStoreError};
pub use memory::{InMemoryStore, RoundTrips};

/// Result type alias for remote-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Byte-level key-value store with TTL support.
///
/// Implementations must be safe to share between every cache of a manager.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the value stored at `key`, or `None` when absent or expired.
    async fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` at `key`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Delete `key`. Returns whether a value was removed.
    async fn delete(&self, key: &[u8]) -> StoreResult<bool>;

    /// Delete several keys. Returns how many values were removed.
    ///
    /// The default issues one delete per key; stores with a batch primitive
    /// should override this with a single round trip.
    async fn delete_many(&self, keys: &[Vec<u8>]) -> StoreResult<u64> {
        let mut deleted = 0u64;
        for key in keys {
            if self.delete(key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Delete every key starting with `prefix`. Returns how many were removed.
    ///
    /// Optional: stores without a scan or pattern-delete primitive keep the
    /// default, which reports `Unsupported`.
    async fn delete_by_prefix(&self, prefix: &[u8]) -> StoreResult<u64> {
        let _ = prefix;
        Err(StoreError::Unsupported {
            operation: "delete_by_prefix".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Store implementing only the required operations.
    #[derive(Default)]
    struct MinimalStore {
        entries: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    }

    #[async_trait]
    impl RemoteStore for MinimalStore {
        async fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set_with_ttl(&self, key: &[u8], value: &[u8], _ttl: Duration) -> StoreResult<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_vec(), value.to_vec());
            Ok(())
        }

        async fn delete(&self, key: &[u8]) -> StoreResult<bool> {
            Ok(self.entries.lock().unwrap().remove(key).is_some())
        }
    }

    #[tokio::test]
    async fn test_default_delete_many_loops() {
        let store = MinimalStore::default();
        store.set_with_ttl(b"a", b"1", Duration::from_secs(1)).await.unwrap();
        store.set_with_ttl(b"b", b"2", Duration::from_secs(1)).await.unwrap();

        let deleted = store
            .delete_many(&[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(store.get(b"a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_delete_by_prefix_unsupported() {
        let store = MinimalStore::default();
        let err = store.delete_by_prefix(b"orders:").await.unwrap_err();
        assert!(matches!(err, StoreError::Unsupported { .. }));
    }
}
