//! LMDB-backed remote store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts, which makes it a stand-in
//! for a networked store when testing redeploys.
//!
//! # Value Format
//!
//! Each stored value is `[expires_at: 8 bytes LE millis][payload]`. Expiry is
//! lazy: an expired entry is removed the first time it is read.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use shapecache_core::StoreError;

use super::{RemoteStore, StoreResult};

const EXPIRY_HEADER_LEN: usize = 8;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Every LMDB failure surfaces to callers as an unavailable store.
impl From<LmdbStoreError> for StoreError {
    fn from(e: LmdbStoreError) -> Self {
        StoreError::Unavailable {
            reason: e.to_string(),
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// LMDB-backed [`RemoteStore`].
///
/// # Example
///
/// ```ignore
/// use shapecache_storage::store::{LmdbStore, RemoteStore};
///
/// let store = LmdbStore::new("/tmp/shapecache", 100)?;
/// store.set_with_ttl(b"orders:\"42\"", b"...", Duration::from_secs(60)).await?;
/// ```
pub struct LmdbStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
}

impl LmdbStore {
    /// Open (or create) a store under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        tracing::debug!(path = %path.as_ref().display(), max_size_mb, "LMDB store opened");

        Ok(Self { env, db })
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<u64, LmdbStoreError> {
        let now = Utc::now().timestamp_millis();
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        let mut expired = Vec::new();
        for entry in self.db.iter(&wtxn).map_err(txn_error)? {
            let (key, bytes) = entry.map_err(txn_error)?;
            if !is_live(bytes, now) {
                expired.push(key.to_vec());
            }
        }

        for key in &expired {
            self.db.delete(&mut wtxn, key).map_err(txn_error)?;
        }
        wtxn.commit().map_err(txn_error)?;
        Ok(expired.len() as u64)
    }

    /// Delete `keys` in a single write transaction.
    ///
    /// Expired entries are removed too but are not counted.
    fn delete_keys(&self, keys: &[Vec<u8>]) -> Result<u64, LmdbStoreError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().timestamp_millis();
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        let mut deleted = 0u64;
        for key in keys {
            if self.delete_live(&mut wtxn, key, now)? {
                deleted += 1;
            }
        }

        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    /// Delete every key starting with `prefix` in one write transaction.
    fn delete_prefixed(&self, prefix: &[u8]) -> Result<u64, LmdbStoreError> {
        let now = Utc::now().timestamp_millis();
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        let mut keys = Vec::new();
        for entry in self.db.prefix_iter(&wtxn, prefix).map_err(txn_error)? {
            let (key, _) = entry.map_err(txn_error)?;
            keys.push(key.to_vec());
        }

        let mut deleted = 0u64;
        for key in &keys {
            if self.delete_live(&mut wtxn, key, now)? {
                deleted += 1;
            }
        }

        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    /// Delete `key`, reporting whether a live entry was removed.
    fn delete_live(&self, wtxn: &mut RwTxn, key: &[u8], now: i64) -> Result<bool, LmdbStoreError> {
        let live = match self.db.get(wtxn, key).map_err(txn_error)? {
            Some(bytes) => is_live(bytes, now),
            None => return Ok(false),
        };
        self.db.delete(wtxn, key).map_err(txn_error)?;
        Ok(live)
    }

    /// Remove `key` if it is still expired when the write transaction runs.
    ///
    /// A write that replaced the entry after it was read is left in place.
    fn remove_if_expired(&self, key: &[u8]) -> Result<(), LmdbStoreError> {
        let now = Utc::now().timestamp_millis();
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let expired = match self.db.get(&wtxn, key).map_err(txn_error)? {
            Some(bytes) => !is_live(bytes, now),
            None => false,
        };
        if expired {
            self.db.delete(&mut wtxn, key).map_err(txn_error)?;
            wtxn.commit().map_err(txn_error)?;
        }
        Ok(())
    }
}

fn is_live(bytes: &[u8], now_millis: i64) -> bool {
    match expires_at(bytes) {
        Some(expires_at) => expires_at > now_millis,
        None => false,
    }
}

fn expires_at(bytes: &[u8]) -> Option<i64> {
    let header: [u8; EXPIRY_HEADER_LEN] = bytes.get(..EXPIRY_HEADER_LEN)?.try_into().ok()?;
    Some(i64::from_le_bytes(header))
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl RemoteStore for LmdbStore {
    async fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let now = Utc::now().timestamp_millis();

        let stored = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            let stored = self.db.get(&rtxn, key).map_err(txn_error)?;
            stored.map(<[u8]>::to_vec)
        };

        match stored {
            Some(bytes) if is_live(&bytes, now) => Ok(Some(bytes[EXPIRY_HEADER_LEN..].to_vec())),
            Some(_) => {
                self.remove_if_expired(key)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> StoreResult<()> {
        let expires_at = Utc::now()
            .timestamp_millis()
            .saturating_add(ttl_millis(ttl));

        let mut full_bytes = Vec::with_capacity(EXPIRY_HEADER_LEN + value.len());
        full_bytes.extend_from_slice(&expires_at.to_le_bytes());
        full_bytes.extend_from_slice(value);

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key, &full_bytes)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.delete_keys(&[key.to_vec()])? > 0)
    }

    async fn delete_many(&self, keys: &[Vec<u8>]) -> StoreResult<u64> {
        Ok(self.delete_keys(keys)?)
    }

    async fn delete_by_prefix(&self, prefix: &[u8]) -> StoreResult<u64> {
        Ok(self.delete_prefixed(prefix)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbStore::new(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_put_and_get() {
        let (store, _temp_dir) = create_test_store();

        store
            .set_with_ttl(b"orders:\"42\"", b"payload", MINUTE)
            .await
            .expect("set should succeed");

        let cached = store.get(b"orders:\"42\"").await.expect("get should succeed");
        assert_eq!(cached, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (store, _temp_dir) = create_test_store();
        let cached = store.get(b"missing").await.expect("get should succeed");
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_entry_is_never_returned() {
        let (store, _temp_dir) = create_test_store();

        store
            .set_with_ttl(b"k", b"v", Duration::ZERO)
            .await
            .expect("set should succeed");
        assert!(store.get(b"k").await.expect("get should succeed").is_none());

        // lazy expiry removed the entry on read
        assert!(!store.delete(b"k").await.expect("delete should succeed"));
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (store, _temp_dir) = create_test_store();

        store.set_with_ttl(b"k", b"first", MINUTE).await.unwrap();
        store.set_with_ttl(b"k", b"second", MINUTE).await.unwrap();

        assert_eq!(store.get(b"k").await.unwrap(), Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _temp_dir) = create_test_store();

        store.set_with_ttl(b"k", b"v", MINUTE).await.unwrap();
        assert!(store.delete(b"k").await.expect("delete should succeed"));
        assert!(store.get(b"k").await.unwrap().is_none());
        assert!(!store.delete(b"k").await.expect("delete should succeed"));
    }

    #[tokio::test]
    async fn test_delete_many() {
        let (store, _temp_dir) = create_test_store();

        for key in ["a", "b", "c"] {
            store.set_with_ttl(key.as_bytes(), b"v", MINUTE).await.unwrap();
        }

        let deleted = store
            .delete_many(&[b"a".to_vec(), b"c".to_vec(), b"missing".to_vec()])
            .await
            .expect("delete_many should succeed");
        assert_eq!(deleted, 2);
        assert!(store.get(b"b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_by_prefix_leaves_other_caches() {
        let (store, _temp_dir) = create_test_store();

        for i in 0..5 {
            let key = format!("orders:{i}");
            store.set_with_ttl(key.as_bytes(), b"v", MINUTE).await.unwrap();
        }
        store.set_with_ttl(b"users:1", b"v", MINUTE).await.unwrap();

        let deleted = store
            .delete_by_prefix(b"orders:")
            .await
            .expect("delete_by_prefix should succeed");
        assert_eq!(deleted, 5);
        assert!(store.get(b"users:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_reported_deleted() {
        let (store, _temp_dir) = create_test_store();

        store.set_with_ttl(b"orders:1", b"v", Duration::ZERO).await.unwrap();
        store.set_with_ttl(b"orders:2", b"v", Duration::ZERO).await.unwrap();
        store.set_with_ttl(b"orders:3", b"v", MINUTE).await.unwrap();

        assert!(!store.delete(b"orders:1").await.unwrap());
        assert_eq!(store.delete_by_prefix(b"orders:").await.unwrap(), 1);
        assert_eq!(store.purge_expired().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lazy_expiry_keeps_rewritten_entry() {
        let (store, _temp_dir) = create_test_store();

        store.set_with_ttl(b"k", b"fresh", MINUTE).await.unwrap();
        store.remove_if_expired(b"k").unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), Some(b"fresh".to_vec()));

        store.set_with_ttl(b"k", b"stale", Duration::ZERO).await.unwrap();
        store.remove_if_expired(b"k").unwrap();
        assert_eq!(store.purge_expired().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, _temp_dir) = create_test_store();

        store.set_with_ttl(b"stale", b"v", Duration::ZERO).await.unwrap();
        store.set_with_ttl(b"fresh", b"v", MINUTE).await.unwrap();

        assert_eq!(store.purge_expired().expect("purge should succeed"), 1);
        assert!(store.get(b"fresh").await.unwrap().is_some());
    }

    #[test]
    fn test_error_maps_to_unavailable() {
        let err: StoreError = LmdbStoreError::Transaction("boom".into()).into();
        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert!(err.to_string().contains("boom"));
    }
}
