//! Cache manager configuration.
//!
//! Settings can be built in code, deserialized (serde / TOML), or loaded from
//! `SHAPECACHE_*` environment variables with defaults for anything unset.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CacheResult, ConfigError, TAG_DELIMITER};

/// Default time-to-live: one day.
pub const DEFAULT_TIME_TO_LIVE_SECS: u64 = 86_400;

/// Delimiter used between cache name and key when none is configured.
pub const DEFAULT_KEY_DELIMITER: &str = ":";

/// How physical keys are scoped to their cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPrefixPolicy {
    /// Logical keys are used as-is; caches share one keyspace.
    None,
    /// Keys are prefixed with `<cache-name><delimiter>`.
    CacheName { delimiter: String },
}

impl KeyPrefixPolicy {
    /// Prefix string for a cache, if this policy prefixes.
    pub fn prefix_for(&self, cache_name: &str) -> Option<String> {
        match self {
            Self::None => None,
            Self::CacheName { delimiter } => Some(format!("{}{}", cache_name, delimiter)),
        }
    }

    pub fn is_prefixed(&self) -> bool {
        matches!(self, Self::CacheName { .. })
    }
}

/// Configuration for a cache manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// TTL applied to caches without an override.
    pub default_time_to_live_secs: u64,

    /// Prefix physical keys with the cache name.
    pub use_key_prefix: bool,

    /// Separator between cache name and key. Blank or unset means `:`.
    pub key_prefix_delimiter: Option<String>,

    /// Per-cache TTL overrides, in seconds.
    pub time_to_live_overrides: BTreeMap<String, u64>,

    /// Caches created eagerly when the manager is built.
    pub cache_names: BTreeSet<String>,

    /// Create unknown caches lazily on first reference.
    pub dynamic: bool,

    /// Wrap caches so writes join an ambient cache transaction.
    pub transaction_aware: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_time_to_live_secs: DEFAULT_TIME_TO_LIVE_SECS,
            use_key_prefix: true,
            key_prefix_delimiter: None,
            time_to_live_overrides: BTreeMap::new(),
            cache_names: BTreeSet::new(),
            dynamic: true,
            transaction_aware: false,
        }
    }
}

impl CacheSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_time_to_live_secs = ttl.as_secs();
        self
    }

    /// Enable or disable key prefixing.
    pub fn with_key_prefix(mut self, enabled: bool) -> Self {
        self.use_key_prefix = enabled;
        self
    }

    /// Set the key prefix delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.key_prefix_delimiter = Some(delimiter.into());
        self
    }

    /// Override the TTL of one cache.
    pub fn with_ttl_override(mut self, cache_name: impl Into<String>, ttl: Duration) -> Self {
        self.time_to_live_overrides
            .insert(cache_name.into(), ttl.as_secs());
        self
    }

    /// Declare a cache to be created eagerly.
    pub fn with_cache_name(mut self, cache_name: impl Into<String>) -> Self {
        self.cache_names.insert(cache_name.into());
        self
    }

    /// Enable or disable dynamic cache creation.
    pub fn with_dynamic(mut self, enabled: bool) -> Self {
        self.dynamic = enabled;
        self
    }

    /// Enable or disable the transaction-aware decoration.
    pub fn with_transaction_aware(mut self, enabled: bool) -> Self {
        self.transaction_aware = enabled;
        self
    }

    /// The manager-wide default TTL.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_time_to_live_secs)
    }

    /// TTL for a cache: exact-name override, else the default.
    pub fn ttl_for(&self, cache_name: &str) -> Duration {
        self.time_to_live_overrides
            .get(cache_name)
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or_else(|| self.default_ttl())
    }

    /// Delimiter in effect, falling back to `:` when unset or blank.
    pub fn delimiter(&self) -> &str {
        match self.key_prefix_delimiter.as_deref() {
            Some(delimiter) if !delimiter.trim().is_empty() => delimiter,
            _ => DEFAULT_KEY_DELIMITER,
        }
    }

    /// Key prefix policy shared by every cache of a manager.
    pub fn key_prefix_policy(&self) -> KeyPrefixPolicy {
        if self.use_key_prefix {
            KeyPrefixPolicy::CacheName {
                delimiter: self.delimiter().to_string(),
            }
        } else {
            KeyPrefixPolicy::None
        }
    }

    /// Check that `name` can be used as a cache name.
    ///
    /// Names must be non-empty. With key prefixing enabled they must not
    /// contain the delimiter, otherwise one cache's prefix could cover the
    /// keys of another (`orders:` and `orders:eu:`).
    pub fn validate_cache_name(&self, name: &str) -> Result<(), ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cache_name".to_string(),
                value: "\"\"".to_string(),
                reason: "cache names must be non-empty".to_string(),
            });
        }
        if self.use_key_prefix && name.contains(self.delimiter()) {
            return Err(ConfigError::InvalidValue {
                field: "cache_name".to_string(),
                value: name.to_string(),
                reason: format!(
                    "cache names must not contain the key delimiter '{}'",
                    self.delimiter()
                ),
            });
        }
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - every TTL is positive
    /// - cache names are non-empty and free of the key delimiter
    /// - the delimiter does not contain the type tag delimiter
    pub fn validate(&self) -> CacheResult<()> {
        if self.default_time_to_live_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_time_to_live_secs".to_string(),
                value: "0".to_string(),
                reason: "default_time_to_live_secs must be positive".to_string(),
            }
            .into());
        }

        for (name, secs) in &self.time_to_live_overrides {
            self.validate_cache_name(name)?;
            if *secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("time_to_live_overrides.{}", name),
                    value: "0".to_string(),
                    reason: "TTL overrides must be positive".to_string(),
                }
                .into());
            }
        }

        for name in &self.cache_names {
            self.validate_cache_name(name)?;
        }

        if self.use_key_prefix && self.delimiter().contains(TAG_DELIMITER) {
            return Err(ConfigError::InvalidValue {
                field: "key_prefix_delimiter".to_string(),
                value: self.delimiter().to_string(),
                reason: format!("delimiter must not contain '{}'", TAG_DELIMITER),
            }
            .into());
        }

        Ok(())
    }

    /// Parse settings from a TOML document. Missing fields take defaults.
    pub fn from_toml_str(source: &str) -> CacheResult<Self> {
        let settings: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Create settings from environment variables.
    ///
    /// Environment variables:
    /// - `SHAPECACHE_DEFAULT_TTL_SECS`: default TTL (default: 86400)
    /// - `SHAPECACHE_USE_KEY_PREFIX`: "true" or "false" (default: true)
    /// - `SHAPECACHE_KEY_PREFIX_DELIMITER`: delimiter (default: ":")
    /// - `SHAPECACHE_TTL_OVERRIDES`: "orders=60,users=3600"
    /// - `SHAPECACHE_CACHE_NAMES`: comma-separated names created eagerly
    /// - `SHAPECACHE_DYNAMIC`: "true" or "false" (default: true)
    /// - `SHAPECACHE_TRANSACTION_AWARE`: "true" or "false" (default: false)
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let default_time_to_live_secs = lookup("SHAPECACHE_DEFAULT_TTL_SECS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.default_time_to_live_secs);

        let use_key_prefix = lookup("SHAPECACHE_USE_KEY_PREFIX")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.use_key_prefix);

        let key_prefix_delimiter = lookup("SHAPECACHE_KEY_PREFIX_DELIMITER");

        let time_to_live_overrides = lookup("SHAPECACHE_TTL_OVERRIDES")
            .map(|s| parse_ttl_overrides(&s))
            .unwrap_or_default();

        let cache_names = lookup("SHAPECACHE_CACHE_NAMES")
            .map(|s| {
                s.split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let dynamic = lookup("SHAPECACHE_DYNAMIC")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.dynamic);

        let transaction_aware = lookup("SHAPECACHE_TRANSACTION_AWARE")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.transaction_aware);

        Self {
            default_time_to_live_secs,
            use_key_prefix,
            key_prefix_delimiter,
            time_to_live_overrides,
            cache_names,
            dynamic,
            transaction_aware,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Parse `name=secs` pairs separated by commas. Malformed pairs are skipped.
fn parse_ttl_overrides(value: &str) -> BTreeMap<String, u64> {
    value
        .split(',')
        .filter_map(|pair| {
            let (name, secs) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), secs.trim().parse().ok()?))
        })
        .collect()
}
