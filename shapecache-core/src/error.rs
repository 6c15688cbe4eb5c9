//! Error types for shapecache operations

use crate::Fingerprint;
use thiserror::Error;

/// Codec errors raised while tagging, encoding or decoding cached values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Type {type_name} is not serializable: {reason}")]
    NotSerializable { type_name: String, reason: String },

    #[error("Malformed type tag {tag:?}: {reason}")]
    MalformedTag { tag: String, reason: String },

    #[error("Unknown type {type_name} for expected type {expected}")]
    UnknownType { type_name: String, expected: String },

    #[error(
        "Type [{type_name}] : Cached Version [{stored}], Current Version [{current}]"
    )]
    VersionMismatch {
        type_name: String,
        stored: Fingerprint,
        current: Fingerprint,
    },

    #[error("Encoding {type_name} failed: {reason}")]
    Encode { type_name: String, reason: String },

    #[error("Decoding {type_name} failed: {reason}")]
    Decode { type_name: String, reason: String },
}

/// Remote-store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Remote store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Operation not supported by the remote store: {operation}")]
    Unsupported { operation: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all shapecache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache {cache_name} has no key prefix; a scoped clear is not possible")]
    ScopedClearUnsupported { cache_name: String },
}

impl CacheError {
    /// True for failures caused by the stored bytes themselves.
    ///
    /// These are the errors a caller may map onto "treat as miss and evict"
    /// behavior. Store and configuration failures are never poisoned entries.
    pub fn is_poisoned_entry(&self) -> bool {
        matches!(
            self,
            CacheError::Codec(
                CodecError::VersionMismatch { .. }
                    | CodecError::MalformedTag { .. }
                    | CodecError::UnknownType { .. }
                    | CodecError::Decode { .. }
            )
        )
    }

    /// True when the remote store could not be reached.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, CacheError::Store(StoreError::Unavailable { .. }))
    }
}

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type alias for shapecache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
