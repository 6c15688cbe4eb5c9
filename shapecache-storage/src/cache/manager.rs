//! Cache manager: owns the named caches of one application.
//!
//! Caches listed in the settings are created when the manager is built.
//! Other names are created lazily on first request when dynamic creation is
//! enabled. Every request for a name returns the same instance.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use shapecache_core::{
    CacheResult, CacheSettings, Cacheable, CodecResult, FingerprintRegistry, KeyPrefixPolicy,
    TypeRegistry, TypeTag, ValueCodec,
};

use super::instance::CacheInstance;
use super::key::KeyCodec;
use super::traits::Cache;
use super::transaction;
use crate::store::RemoteStore;

type Declaration = fn(&ValueCodec) -> CodecResult<TypeTag>;

/// Builder for a [`CacheManager`].
pub struct CacheManagerBuilder {
    store: Arc<dyn RemoteStore>,
    settings: CacheSettings,
    fingerprints: Option<Arc<FingerprintRegistry>>,
    types: Option<Arc<TypeRegistry>>,
    declarations: Vec<Declaration>,
}

impl CacheManagerBuilder {
    fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            settings: CacheSettings::default(),
            fingerprints: None,
            types: None,
            declarations: Vec::new(),
        }
    }

    pub fn settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use a dedicated fingerprint registry instead of the process-wide one.
    pub fn fingerprints(mut self, fingerprints: Arc<FingerprintRegistry>) -> Self {
        self.fingerprints = Some(fingerprints);
        self
    }

    /// Registry used to resolve subtypes on read.
    pub fn types(mut self, types: Arc<TypeRegistry>) -> Self {
        self.types = Some(types);
        self
    }

    /// Validate `T` when the manager is built.
    pub fn declare_type<T: Cacheable>(mut self) -> Self {
        self.declarations.push(ValueCodec::declare::<T>);
        self
    }

    /// Build the manager.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The settings fail validation
    /// - A declared type cannot be fingerprinted
    pub fn build(self) -> CacheResult<CacheManager> {
        self.settings.validate()?;

        let codec = ValueCodec::new(
            self.fingerprints
                .unwrap_or_else(FingerprintRegistry::global),
            self.types.unwrap_or_default(),
        );

        for declare in &self.declarations {
            let tag = declare(&codec)?;
            tracing::debug!(tag = %tag, "Declared cacheable type");
        }

        let manager = CacheManager {
            prefix_policy: self.settings.key_prefix_policy(),
            settings: self.settings,
            store: self.store,
            codec: Arc::new(codec),
            caches: RwLock::new(HashMap::new()),
        };

        {
            let mut caches = manager.caches.write().unwrap_or_else(PoisonError::into_inner);
            for name in &manager.settings.cache_names {
                caches.insert(name.clone(), manager.create_cache(name));
            }
        }

        tracing::info!(
            caches = manager.settings.cache_names.len(),
            dynamic = manager.settings.dynamic,
            prefixed = manager.prefix_policy.is_prefixed(),
            transaction_aware = manager.settings.transaction_aware,
            default_ttl_secs = manager.settings.default_time_to_live_secs,
            "Cache manager initialized"
        );

        Ok(manager)
    }
}

/// Registry of named caches sharing one remote store.
pub struct CacheManager {
    settings: CacheSettings,
    prefix_policy: KeyPrefixPolicy,
    store: Arc<dyn RemoteStore>,
    codec: Arc<ValueCodec>,
    caches: RwLock<HashMap<String, Arc<dyn Cache>>>,
}

impl CacheManager {
    pub fn builder(store: Arc<dyn RemoteStore>) -> CacheManagerBuilder {
        CacheManagerBuilder::new(store)
    }

    /// Manager with `settings` and the process-wide fingerprint registry.
    pub fn new(store: Arc<dyn RemoteStore>, settings: CacheSettings) -> CacheResult<Self> {
        Self::builder(store).settings(settings).build()
    }

    /// Cache registered under `name`.
    ///
    /// Returns `None` for a name that fails
    /// [`CacheSettings::validate_cache_name`], or for an unknown name when
    /// dynamic creation is disabled. Concurrent first requests for the same
    /// name observe a single instance.
    pub fn get_cache(&self, name: &str) -> Option<Arc<dyn Cache>> {
        if let Some(cache) = self
            .caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Some(Arc::clone(cache));
        }

        if let Err(e) = self.settings.validate_cache_name(name) {
            tracing::warn!(cache = name, error = %e, "Rejected cache name");
            return None;
        }
        if !self.settings.dynamic {
            tracing::debug!(cache = name, "Unknown cache requested; dynamic creation disabled");
            return None;
        }

        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
        let cache = caches.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(cache = name, "Creating cache on first use");
            self.create_cache(name)
        });
        Some(Arc::clone(cache))
    }

    /// TTL applied to entries of `name`.
    pub fn resolve_ttl(&self, name: &str) -> Duration {
        self.settings.ttl_for(name)
    }

    /// Names of every cache created so far, sorted.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn codec(&self) -> &Arc<ValueCodec> {
        &self.codec
    }

    /// Validate `T` against this manager's codec.
    pub fn declare_type<T: Cacheable>(&self) -> CacheResult<TypeTag> {
        Ok(self.codec.declare::<T>()?)
    }

    /// Apply the configured decorations to `cache`.
    ///
    /// Already-decorated caches are returned unchanged.
    pub fn decorate_cache(&self, cache: Arc<dyn Cache>) -> Arc<dyn Cache> {
        if self.settings.transaction_aware {
            transaction::decorate(cache)
        } else {
            cache
        }
    }

    fn create_cache(&self, name: &str) -> Arc<dyn Cache> {
        let instance = CacheInstance::new(
            name,
            KeyCodec::new(name, &self.prefix_policy),
            self.resolve_ttl(name),
            Arc::clone(&self.codec),
            Arc::clone(&self.store),
        );
        self.decorate_cache(Arc::new(instance))
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("settings", &self.settings)
            .field("caches", &self.cache_names())
            .finish_non_exhaustive()
    }
}
