//! Named caches over a shared remote store.
//!
//! A [`CacheManager`] hands out one [`Cache`] per name. Each cache prefixes
//! its keys with its own name, applies its own TTL, and encodes values with
//! the manager's versioned codec, so an entry written by an older build of a
//! type is reported as a version mismatch instead of being decoded.
//!
//! # Example
//!
//! ```ignore
//! let manager = CacheManager::builder(Arc::new(InMemoryStore::new()))
//!     .settings(CacheSettings::new().with_ttl_override("orders", Duration::from_secs(60)))
//!     .declare_type::<Order>()
//!     .build()?;
//!
//! let orders = manager.get_cache("orders").expect("dynamic caches are enabled");
//! orders.put(&CacheKey::from("42"), &order).await?;
//! let cached: Option<Order> = orders.get(&CacheKey::from("42")).await?;
//! ```

pub mod instance;
pub mod key;
pub mod manager;
pub mod operations;
pub mod traits;
pub mod transaction;

pub use instance::CacheInstance;
pub use key::{CacheKey, KeyCodec};
pub use manager::{CacheManager, CacheManagerBuilder};
pub use operations::CacheOperations;
pub use traits::{Cache, CacheExt, CacheStats, Capabilities, StatsRecorder};
pub use transaction::{decorate, CacheTransaction, TransactionAwareCache};
