//! shapecache Test Utilities
//!
//! Shared test infrastructure for the shapecache workspace:
//! - Fixture types, including two builds of the same logical type
//! - Mock stores that fail on demand
//! - Proptest generators
//! - Assertions for the cache error taxonomy

// Re-export core types for convenience
pub use shapecache_core::{
    CacheError, CacheResult, CacheSettings, Cacheable, CodecError, Fingerprint,
    FingerprintRegistry, StoreError, TypeRegistry, TypeShape, ValueCodec, Versioned,
};
pub use shapecache_storage::{
    Cache, CacheExt, CacheKey, CacheManager, CacheOperations, InMemoryStore, RemoteStore,
    StoreResult,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Install a test-writer subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCK STORES
// ============================================================================

/// Store whose every operation reports the store as unavailable.
#[derive(Debug, Clone, Default)]
pub struct FailingStore;

fn unavailable() -> StoreError {
    StoreError::Unavailable {
        reason: "connection refused".to_string(),
    }
}

#[async_trait]
impl RemoteStore for FailingStore {
    async fn get(&self, _key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Err(unavailable())
    }

    async fn set_with_ttl(&self, _key: &[u8], _value: &[u8], _ttl: Duration) -> StoreResult<()> {
        Err(unavailable())
    }

    async fn delete(&self, _key: &[u8]) -> StoreResult<bool> {
        Err(unavailable())
    }

    async fn delete_many(&self, _keys: &[Vec<u8>]) -> StoreResult<u64> {
        Err(unavailable())
    }

    async fn delete_by_prefix(&self, _prefix: &[u8]) -> StoreResult<u64> {
        Err(unavailable())
    }
}

/// In-memory store that can be taken offline and brought back.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    offline: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    fn check(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for FlakyStore {
    async fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.check()?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &[u8]) -> StoreResult<bool> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn delete_many(&self, keys: &[Vec<u8>]) -> StoreResult<u64> {
        self.check()?;
        self.inner.delete_many(keys).await
    }

    async fn delete_by_prefix(&self, prefix: &[u8]) -> StoreResult<u64> {
        self.check()?;
        self.inner.delete_by_prefix(prefix).await
    }
}

/// Manager over `store` with a private fingerprint registry.
pub fn test_manager(
    store: Arc<dyn RemoteStore>,
    settings: CacheSettings,
) -> CacheResult<CacheManager> {
    CacheManager::builder(store)
        .settings(settings)
        .fingerprints(Arc::new(FingerprintRegistry::new()))
        .build()
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Fixture types. `OrderV1` and `OrderV2` model two deployments of the
    //! same logical type `shop.Order`.

    use super::*;

    pub const ORDER_TYPE_NAME: &str = "shop.Order";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct OrderV1 {
        pub amount: i64,
    }

    impl Cacheable for OrderV1 {
        const TYPE_NAME: &'static str = ORDER_TYPE_NAME;

        fn shape() -> TypeShape {
            TypeShape::structure().field("amount", "i64")
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct OrderV2 {
        pub amount: i64,
        pub currency: String,
    }

    impl Cacheable for OrderV2 {
        const TYPE_NAME: &'static str = ORDER_TYPE_NAME;

        fn shape() -> TypeShape {
            TypeShape::structure()
                .field("amount", "i64")
                .field("currency", "string")
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Address {
        pub city: String,
    }

    impl Cacheable for Address {
        const TYPE_NAME: &'static str = "shop.Address";

        fn shape() -> TypeShape {
            TypeShape::structure().field("city", "string")
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Customer {
        pub name: String,
        pub address: Versioned<Address>,
    }

    impl Cacheable for Customer {
        const TYPE_NAME: &'static str = "shop.Customer";

        fn shape() -> TypeShape {
            TypeShape::structure()
                .field("name", "string")
                .nested::<Address>("address")
        }
    }

    /// Declares no structural identity and cannot be cached.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Opaque;

    impl Cacheable for Opaque {
        const TYPE_NAME: &'static str = "shop.Opaque";

        fn shape() -> TypeShape {
            TypeShape::Opaque
        }
    }

    pub fn order(amount: i64) -> OrderV1 {
        OrderV1 { amount }
    }

    pub fn customer(name: &str, city: &str) -> Customer {
        Customer {
            name: name.to_string(),
            address: Versioned(Address {
                city: city.to_string(),
            }),
        }
    }

    /// Settings with a short TTL for `orders` and the default for the rest.
    pub fn orders_settings() -> CacheSettings {
        CacheSettings::new()
            .with_cache_name("orders")
            .with_ttl_override("orders", Duration::from_secs(60))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for shapecache types.

    use super::fixtures::{Address, Customer, OrderV1};
    use super::*;
    use proptest::prelude::*;

    /// A cache name valid for any delimiter.
    pub fn arb_cache_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,15}"
    }

    pub fn arb_order() -> impl Strategy<Value = OrderV1> {
        any::<i64>().prop_map(|amount| OrderV1 { amount })
    }

    pub fn arb_customer() -> impl Strategy<Value = Customer> {
        (any::<String>(), any::<String>()).prop_map(|(name, city)| Customer {
            name,
            address: Versioned(Address { city }),
        })
    }

    /// Serializable or raw logical key.
    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        prop_oneof![
            any::<String>().prop_map(CacheKey::from),
            any::<u64>().prop_map(CacheKey::from),
            proptest::collection::vec(any::<u8>(), 1..32).prop_map(CacheKey::raw),
        ]
    }

    /// TTL between one second and one day.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1u64..=86_400).prop_map(Duration::from_secs)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over cache results.

    use super::*;

    /// Assert the result is a version mismatch for `type_name`.
    pub fn assert_version_mismatch<T: std::fmt::Debug>(result: &CacheResult<T>, type_name: &str) {
        match result {
            Err(CacheError::Codec(CodecError::VersionMismatch {
                type_name: actual, ..
            })) => assert_eq!(actual, type_name, "mismatch reported for wrong type"),
            other => panic!("Expected VersionMismatch for {}, got: {:?}", type_name, other),
        }
    }

    /// Assert the result is a store-unavailable error.
    pub fn assert_store_unavailable<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(e) if e.is_store_unavailable() => {}
            other => panic!("Expected StoreUnavailable, got: {:?}", other),
        }
    }

    /// Assert the result is an error caused by the stored bytes.
    pub fn assert_poisoned<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(e) if e.is_poisoned_entry() => {}
            other => panic!("Expected a poisoned entry error, got: {:?}", other),
        }
    }
}
