//! Version-fingerprinted value codec.
//!
//! # Wire Format
//!
//! Every cached value is stored as a two-element JSON array:
//!
//! ```text
//! ["<type-name>%<fingerprint>", <payload>]
//! ```
//!
//! The payload is the serde JSON form of the value. Nested cacheable values
//! wrapped in [`Versioned`](crate::Versioned) use the same pair layout. This
//! format is persisted in the remote store; changing it invalidates every
//! existing entry.
//!
//! # Decoding Contract
//!
//! A value is never returned unless the fingerprint stored in its tag equals
//! the fingerprint of the type currently loaded. The tag is parsed and checked
//! before the payload is interpreted.

use std::sync::Arc;

use crate::scope::{self, ScopedFailure};
use crate::{
    Cacheable, CodecError, CodecResult, Fingerprint, FingerprintRegistry, TypeRegistry, TypeTag,
    TypeTagCodec,
};

/// Serializes values with an embedded type tag and validates it on read.
#[derive(Debug, Clone)]
pub struct ValueCodec {
    tags: TypeTagCodec,
    types: Arc<TypeRegistry>,
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::new(FingerprintRegistry::global(), Arc::new(TypeRegistry::new()))
    }
}

impl ValueCodec {
    pub fn new(fingerprints: Arc<FingerprintRegistry>, types: Arc<TypeRegistry>) -> Self {
        Self {
            tags: TypeTagCodec::new(fingerprints),
            types,
        }
    }

    pub fn tags(&self) -> &TypeTagCodec {
        &self.tags
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn fingerprints(&self) -> &Arc<FingerprintRegistry> {
        self.tags.fingerprints()
    }

    /// Validate `T` up front and return its tag.
    ///
    /// Used at startup to fail fast on types that cannot be cached.
    pub fn declare<T: Cacheable>(&self) -> CodecResult<TypeTag> {
        self.tags.encode::<T>()
    }

    /// Serialize `value` into the `[tag, payload]` wire format.
    pub fn serialize<T: Cacheable>(&self, value: &T) -> CodecResult<Vec<u8>> {
        let tag = self.tags.encode::<T>()?;
        let payload = scope::run(self.fingerprints(), || serde_json::to_value(value))
            .map_err(|failure| {
                scoped_error(failure, |reason| CodecError::Encode {
                    type_name: T::TYPE_NAME.to_string(),
                    reason,
                })
            })?;

        serde_json::to_vec(&(tag.to_string(), payload)).map_err(|e| CodecError::Encode {
            type_name: T::TYPE_NAME.to_string(),
            reason: e.to_string(),
        })
    }

    /// Deserialize bytes written by [`serialize`](Self::serialize) as `T`.
    ///
    /// The stored type name must be `T` itself or a subtype registered under
    /// `T`; otherwise this fails with `UnknownType`. A stored fingerprint
    /// that differs from the current one fails with `VersionMismatch`.
    pub fn deserialize<T: Cacheable>(&self, bytes: &[u8]) -> CodecResult<T> {
        let (raw_tag, payload) = read_envelope::<T>(bytes)?;
        let tag = self.tags.decode(&raw_tag)?;

        if tag.type_name() == T::TYPE_NAME {
            let current = self.fingerprints().fingerprint_of::<T>()?;
            check_fingerprint(&tag, current)?;
            return self.decode_payload(T::TYPE_NAME, || serde_json::from_value::<T>(payload));
        }

        let decoder = self
            .types
            .resolve::<T>(tag.type_name())
            .ok_or_else(|| CodecError::UnknownType {
                type_name: tag.type_name().to_string(),
                expected: T::TYPE_NAME.to_string(),
            })?;
        let current = decoder.fingerprint(self.fingerprints())?;
        check_fingerprint(&tag, current)?;
        self.decode_payload(decoder.type_name(), || decoder.decode(payload))
    }

    fn decode_payload<T>(
        &self,
        type_name: &str,
        decode: impl FnOnce() -> Result<T, serde_json::Error>,
    ) -> CodecResult<T> {
        scope::run(self.fingerprints(), decode).map_err(|failure| {
            scoped_error(failure, |reason| CodecError::Decode {
                type_name: type_name.to_string(),
                reason,
            })
        })
    }
}

fn read_envelope<T: Cacheable>(bytes: &[u8]) -> CodecResult<(String, serde_json::Value)> {
    let (tag, payload): (serde_json::Value, serde_json::Value) = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::Decode {
            type_name: T::TYPE_NAME.to_string(),
            reason: format!("invalid [tag, payload] envelope: {}", e),
        })?;

    match tag {
        serde_json::Value::String(tag) => Ok((tag, payload)),
        other => Err(CodecError::MalformedTag {
            tag: other.to_string(),
            reason: "tag is not a string".to_string(),
        }),
    }
}

fn check_fingerprint(tag: &TypeTag, current: Fingerprint) -> CodecResult<()> {
    if tag.fingerprint() != current {
        return Err(CodecError::VersionMismatch {
            type_name: tag.type_name().to_string(),
            stored: tag.fingerprint(),
            current,
        });
    }
    Ok(())
}

/// Prefer the typed failure recorded by a nested value over serde's message.
fn scoped_error(failure: ScopedFailure, wrap: impl FnOnce(String) -> CodecError) -> CodecError {
    match failure {
        ScopedFailure::Nested(err) => err,
        ScopedFailure::Serde(e) => wrap(e.to_string()),
    }
}
