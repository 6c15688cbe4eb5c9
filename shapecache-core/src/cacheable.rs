//! The cacheable marker trait.

use serde::{de::DeserializeOwned, Serialize};

use crate::TypeShape;

/// Marker trait for types that can be stored in a cache.
///
/// # Implementation Requirements
///
/// - `TYPE_NAME` is the canonical name written into every type tag. It must
///   be non-empty, must not contain `%`, and must stay stable across deploys
///   for as long as existing entries should remain readable.
/// - `shape()` must describe the serialized form: list every serialized
///   field in order, or return an explicit [`TypeShape::Declared`] version
///   that is bumped whenever the serialized form changes.
/// - Payload decoding is strict about extra data only when the type says so;
///   annotate structs with `#[serde(deny_unknown_fields)]` to reject stored
///   payloads that carry fields the current type does not know.
/// - Fields holding other cacheable types are declared with
///   [`TypeShape::nested`], which folds the nested fingerprint into this
///   one. Wrapping such a field in [`Versioned`](crate::Versioned) also
///   writes a tag for it, so a drift is reported against the nested name.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Canonical type name.
    const TYPE_NAME: &'static str;

    /// Declared serializable shape.
    fn shape() -> TypeShape;
}

macro_rules! declared_scalar {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Cacheable for $ty {
                const TYPE_NAME: &'static str = $name;

                fn shape() -> TypeShape {
                    TypeShape::Declared(1)
                }
            }
        )*
    };
}

declared_scalar! {
    String => "string",
    bool => "bool",
    i32 => "i32",
    i64 => "i64",
    u32 => "u32",
    u64 => "u64",
    f64 => "f64",
}
