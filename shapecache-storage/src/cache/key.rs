//! Logical cache keys and their physical (store-level) encoding.
//!
//! A logical key is either raw bytes or any serializable value, encoded as
//! compact JSON. A serialized key is placed after the cache-name prefix. Raw
//! bytes are already a complete physical key and are used as-is, without the
//! prefix, so they are outside the reach of a scoped `clear()`.

use serde::Serialize;
use shapecache_core::{CodecError, CodecResult, KeyPrefixPolicy};
use uuid::Uuid;

/// A logical cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Complete physical key, never prefixed.
    Raw(Vec<u8>),
    /// JSON encoding of a serializable key.
    Serialized(Vec<u8>),
}

impl CacheKey {
    /// Encode any serializable value as a key.
    pub fn new<K: Serialize + ?Sized>(key: &K) -> CodecResult<Self> {
        serde_json::to_vec(key)
            .map(CacheKey::Serialized)
            .map_err(|e| CodecError::Encode {
                type_name: std::any::type_name::<K>().to_string(),
                reason: e.to_string(),
            })
    }

    /// Use `bytes` as the physical key, skipping serialization and prefixing.
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        CacheKey::Raw(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            CacheKey::Raw(bytes) | CacheKey::Serialized(bytes) => bytes,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, CacheKey::Raw(_))
    }

    fn json_string(value: &str) -> Self {
        CacheKey::Serialized(serde_json::Value::from(value).to_string().into_bytes())
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        CacheKey::json_string(value)
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        CacheKey::json_string(&value)
    }
}

impl From<&String> for CacheKey {
    fn from(value: &String) -> Self {
        CacheKey::json_string(value)
    }
}

impl From<Uuid> for CacheKey {
    fn from(value: Uuid) -> Self {
        CacheKey::json_string(&value.to_string())
    }
}

macro_rules! integer_key {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for CacheKey {
                fn from(value: $ty) -> Self {
                    CacheKey::Serialized(value.to_string().into_bytes())
                }
            }
        )*
    };
}

integer_key!(i32, i64, u32, u64);

/// Maps logical keys of one cache onto physical store keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: Option<Vec<u8>>,
}

impl KeyCodec {
    /// Key codec for `cache_name` under `policy`.
    ///
    /// The prefix is rendered to bytes once here, not per key.
    pub fn new(cache_name: &str, policy: &KeyPrefixPolicy) -> Self {
        Self {
            prefix: policy.prefix_for(cache_name).map(String::into_bytes),
        }
    }

    /// Key codec that leaves logical keys untouched.
    pub fn unprefixed() -> Self {
        Self { prefix: None }
    }

    pub fn prefix(&self) -> Option<&[u8]> {
        self.prefix.as_deref()
    }

    /// Physical key for `key`.
    pub fn physical_key(&self, key: &CacheKey) -> Vec<u8> {
        let logical = match key {
            CacheKey::Raw(bytes) => return bytes.clone(),
            CacheKey::Serialized(bytes) => bytes,
        };
        match &self.prefix {
            None => logical.clone(),
            Some(prefix) => {
                let mut physical = Vec::with_capacity(prefix.len() + logical.len());
                physical.extend_from_slice(prefix);
                physical.extend_from_slice(logical);
                physical
            }
        }
    }

    pub fn physical_keys(&self, keys: &[CacheKey]) -> Vec<Vec<u8>> {
        keys.iter().map(|key| self.physical_key(key)).collect()
    }
}
