//! Transaction-aware cache decoration.
//!
//! A [`TransactionAwareCache`] defers writes and evictions issued inside a
//! [`CacheTransaction`] scope until the transaction commits; a rollback
//! discards them. Reads always go straight to the wrapped cache. Outside a
//! transaction scope the decorator behaves exactly like the cache it wraps.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use shapecache_core::{CacheResult, ValueCodec};

use super::key::CacheKey;
use super::traits::{Cache, Capabilities, StatsRecorder};

tokio::task_local! {
    static ACTIVE_TRANSACTION: CacheTransaction;
}

enum PendingOp {
    Put { key: CacheKey, value: Vec<u8> },
    Evict { key: CacheKey },
    EvictAll { keys: Vec<CacheKey> },
    Clear,
}

struct PendingWrite {
    cache: Arc<dyn Cache>,
    op: PendingOp,
}

impl PendingWrite {
    async fn apply(self) -> CacheResult<()> {
        match self.op {
            PendingOp::Put { key, value } => self.cache.put_encoded(&key, value).await,
            PendingOp::Evict { key } => self.cache.evict(&key).await,
            PendingOp::EvictAll { keys } => self.cache.evict_all(&keys).await.map(|_| ()),
            PendingOp::Clear => self.cache.clear().await.map(|_| ()),
        }
    }
}

/// Cache mutations buffered until commit.
///
/// Cloning shares the same buffer.
#[derive(Clone, Default)]
pub struct CacheTransaction {
    pending: Arc<Mutex<Vec<PendingWrite>>>,
}

impl CacheTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transaction bound to the current task, if any.
    pub fn current() -> Option<CacheTransaction> {
        ACTIVE_TRANSACTION.try_with(|tx| tx.clone()).ok()
    }

    /// Run `future` with this transaction active.
    pub async fn scope<F: Future>(&self, future: F) -> F::Output {
        ACTIVE_TRANSACTION.scope(self.clone(), future).await
    }

    /// Number of buffered mutations.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Apply buffered mutations in the order they were issued.
    ///
    /// Stops at the first failure; mutations after it are dropped.
    pub async fn commit(self) -> CacheResult<()> {
        let pending = self.take();
        let count = pending.len();
        for write in pending {
            write.apply().await?;
        }
        tracing::debug!(applied = count, "Cache transaction committed");
        Ok(())
    }

    /// Discard buffered mutations. Returns how many were dropped.
    pub fn rollback(self) -> usize {
        let discarded = self.take().len();
        tracing::debug!(discarded, "Cache transaction rolled back");
        discarded
    }

    fn take(&self) -> Vec<PendingWrite> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn enlist(&self, cache: Arc<dyn Cache>, op: PendingOp) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PendingWrite { cache, op });
    }
}

impl std::fmt::Debug for CacheTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTransaction")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Decorator deferring mutations to the active [`CacheTransaction`].
pub struct TransactionAwareCache {
    inner: Arc<dyn Cache>,
}

impl TransactionAwareCache {
    pub fn new(inner: Arc<dyn Cache>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<dyn Cache> {
        &self.inner
    }
}

/// Wrap `cache` in a [`TransactionAwareCache`] unless it already is one.
pub fn decorate(cache: Arc<dyn Cache>) -> Arc<dyn Cache> {
    if cache.capabilities().contains(Capabilities::TRANSACTION_AWARE) {
        return cache;
    }
    Arc::new(TransactionAwareCache::new(cache))
}

#[async_trait]
impl Cache for TransactionAwareCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn time_to_live(&self) -> Duration {
        self.inner.time_to_live()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities() | Capabilities::TRANSACTION_AWARE
    }

    fn codec(&self) -> &ValueCodec {
        self.inner.codec()
    }

    fn recorder(&self) -> &StatsRecorder {
        self.inner.recorder()
    }

    async fn get_encoded(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        self.inner.get_encoded(key).await
    }

    async fn put_encoded(&self, key: &CacheKey, value: Vec<u8>) -> CacheResult<()> {
        match CacheTransaction::current() {
            Some(tx) => {
                tx.enlist(
                    Arc::clone(&self.inner),
                    PendingOp::Put {
                        key: key.clone(),
                        value,
                    },
                );
                Ok(())
            }
            None => self.inner.put_encoded(key, value).await,
        }
    }

    async fn evict(&self, key: &CacheKey) -> CacheResult<()> {
        match CacheTransaction::current() {
            Some(tx) => {
                tx.enlist(Arc::clone(&self.inner), PendingOp::Evict { key: key.clone() });
                Ok(())
            }
            None => self.inner.evict(key).await,
        }
    }

    /// Inside a transaction the eviction is deferred and reports 0.
    async fn evict_all(&self, keys: &[CacheKey]) -> CacheResult<u64> {
        match CacheTransaction::current() {
            Some(tx) => {
                tx.enlist(
                    Arc::clone(&self.inner),
                    PendingOp::EvictAll {
                        keys: keys.to_vec(),
                    },
                );
                Ok(0)
            }
            None => self.inner.evict_all(keys).await,
        }
    }

    /// Inside a transaction the clear is deferred and reports 0.
    async fn clear(&self) -> CacheResult<u64> {
        match CacheTransaction::current() {
            Some(tx) => {
                tx.enlist(Arc::clone(&self.inner), PendingOp::Clear);
                Ok(0)
            }
            None => self.inner.clear().await,
        }
    }
}
