//! In-process store with TTL expiry.
//!
//! Useful for tests and single-process deployments. Besides the
//! [`RemoteStore`] contract it exposes hooks to inspect TTLs, plant raw
//! bytes, force expiry, and count round trips per operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{RemoteStore, StoreResult};

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Vec<u8>,
    ttl: Duration,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Number of store calls made, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundTrips {
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub batch_deletes: u64,
    pub prefix_deletes: u64,
}

impl RoundTrips {
    /// Total calls of every kind.
    pub fn total(&self) -> u64 {
        self.gets + self.sets + self.deletes + self.batch_deletes + self.prefix_deletes
    }
}

#[derive(Debug, Default)]
struct RoundTripCounters {
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    batch_deletes: AtomicU64,
    prefix_deletes: AtomicU64,
}

/// In-memory [`RemoteStore`] with per-entry expiry.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<Vec<u8>, StoredEntry>>,
    counters: RoundTripCounters,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists at `key`.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.peek(key).is_some()
    }

    /// Live value at `key`, without counting a round trip.
    pub fn peek(&self, key: &[u8]) -> Option<Vec<u8>> {
        let now = Instant::now();
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// TTL the live entry at `key` was written with.
    pub fn ttl_of(&self, key: &[u8]) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.ttl)
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        let now = Instant::now();
        let mut keys: Vec<Vec<u8>> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Write raw bytes directly, bypassing the round-trip counters.
    pub fn insert_raw(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, ttl: Duration) {
        self.write_entry(key.into(), value.into(), ttl);
    }

    /// Expire the entry at `key` immediately, as if its TTL had elapsed.
    pub fn expire(&self, key: &[u8]) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Snapshot of the round-trip counters.
    pub fn round_trips(&self) -> RoundTrips {
        RoundTrips {
            gets: self.counters.gets.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            batch_deletes: self.counters.batch_deletes.load(Ordering::Relaxed),
            prefix_deletes: self.counters.prefix_deletes.load(Ordering::Relaxed),
        }
    }

    fn write_entry(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(u32::MAX as u64));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key,
                StoredEntry {
                    value,
                    ttl,
                    expires_at,
                },
            );
    }

    fn remove_live(entries: &mut HashMap<Vec<u8>, StoredEntry>, key: &[u8], now: Instant) -> bool {
        entries
            .remove(key)
            .map(|entry| entry.is_live(now))
            .unwrap_or(false)
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.write_entry(key.to_vec(), value.to_vec(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> StoreResult<bool> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Self::remove_live(&mut entries, key, Instant::now()))
    }

    async fn delete_many(&self, keys: &[Vec<u8>]) -> StoreResult<u64> {
        self.counters.batch_deletes.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .iter()
            .filter(|key| Self::remove_live(&mut entries, key, now))
            .count() as u64)
    }

    async fn delete_by_prefix(&self, prefix: &[u8]) -> StoreResult<u64> {
        self.counters.prefix_deletes.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let matching: Vec<Vec<u8>> = entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        Ok(matching
            .iter()
            .filter(|key| Self::remove_live(&mut entries, key, now))
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryStore::new();
        store
            .set_with_ttl(b"orders:1", b"value", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get(b"orders:1").await.unwrap(), Some(b"value".to_vec()));
        assert_eq!(store.ttl_of(b"orders:1"), Some(Duration::from_secs(60)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.round_trips().sets, 1);
        assert_eq!(store.round_trips().gets, 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let store = InMemoryStore::new();
        assert!(store.get(b"missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let store = InMemoryStore::new();
        store.set_with_ttl(b"k", b"v", Duration::ZERO).await.unwrap();
        assert!(store.get(b"k").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expire_simulates_ttl_elapsed() {
        let store = InMemoryStore::new();
        store
            .set_with_ttl(b"k", b"v", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.expire(b"k"));
        assert!(store.get(b"k").await.unwrap().is_none());
        assert!(!store.expire(b"k"));
    }

    #[tokio::test]
    async fn test_delete_many_is_one_round_trip() {
        let store = InMemoryStore::new();
        let keys: [&[u8]; 3] = [b"a", b"b", b"c"];
        for key in keys {
            store.insert_raw(key, &b"v"[..], Duration::from_secs(60));
        }

        let deleted = store
            .delete_many(&[b"a".to_vec(), b"b".to_vec(), b"zz".to_vec()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.keys(), vec![b"c".to_vec()]);

        let trips = store.round_trips();
        assert_eq!(trips.batch_deletes, 1);
        assert_eq!(trips.deletes, 0);
        assert_eq!(trips.total(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_prefix() {
        let store = InMemoryStore::new();
        store.insert_raw(&b"orders:1"[..], &b"v"[..], Duration::from_secs(60));
        store.insert_raw(&b"orders:2"[..], &b"v"[..], Duration::from_secs(60));
        store.insert_raw(&b"users:1"[..], &b"v"[..], Duration::from_secs(60));

        assert_eq!(store.delete_by_prefix(b"orders:").await.unwrap(), 2);
        assert_eq!(store.keys(), vec![b"users:1".to_vec()]);
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let store = InMemoryStore::new();
        store.insert_raw(&b"k"[..], &b"v"[..], Duration::from_secs(60));
        assert!(store.delete(b"k").await.unwrap());
        assert!(!store.delete(b"k").await.unwrap());
        assert_eq!(store.round_trips().deletes, 2);
    }
}
