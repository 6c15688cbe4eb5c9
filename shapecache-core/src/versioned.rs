//! Version-checked nested values.
//!
//! `Versioned<T>` serializes as the same `[tag, payload]` pair the top-level
//! codec writes, so a nested value carries its own fingerprint. On decode the
//! tag is validated before the payload is touched, and a mismatch fails the
//! whole enclosing value.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::{self, SerializeTuple};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{scope, Cacheable, CodecError, TypeTag, TypeTagCodec};

/// A nested cacheable value that carries its own type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Versioned<T>(pub T);

impl<T> Versioned<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Versioned<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> Deref for Versioned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Versioned<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: Cacheable> Serialize for Versioned<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tag = TypeTagCodec::new(scope::current_fingerprints())
            .encode::<T>()
            .map_err(|e| {
                scope::record_failure(e.clone());
                <S::Error as ser::Error>::custom(e)
            })?;

        let mut pair = serializer.serialize_tuple(2)?;
        pair.serialize_element(&tag.to_string())?;
        pair.serialize_element(&self.0)?;
        pair.end()
    }
}

impl<'de, T: Cacheable> Deserialize<'de> for Versioned<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_tuple(2, VersionedVisitor(PhantomData))
    }
}

struct VersionedVisitor<T>(PhantomData<T>);

impl<'de, T: Cacheable> Visitor<'de> for VersionedVisitor<T> {
    type Value = Versioned<T>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a [tag, payload] pair for {}", T::TYPE_NAME)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let raw_tag: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;

        let tag = TypeTag::parse(&raw_tag).map_err(fail)?;
        if tag.type_name() != T::TYPE_NAME {
            return Err(fail(CodecError::UnknownType {
                type_name: tag.type_name().to_string(),
                expected: T::TYPE_NAME.to_string(),
            }));
        }

        let current = scope::current_fingerprints()
            .fingerprint_of::<T>()
            .map_err(fail)?;
        if tag.fingerprint() != current {
            return Err(fail(CodecError::VersionMismatch {
                type_name: T::TYPE_NAME.to_string(),
                stored: tag.fingerprint(),
                current,
            }));
        }

        let value: T = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok(Versioned(value))
    }
}

fn fail<E: de::Error>(err: CodecError) -> E {
    scope::record_failure(err.clone());
    E::custom(err)
}
