//! Structural fingerprints and the process-wide fingerprint memo.
//!
//! A [`Fingerprint`] is a 64-bit stand-in for the serializable shape of a
//! [`Cacheable`] type. It is written into every cached value and compared
//! against the fingerprint of the type loaded in the reading process.
//!
//! # Wire Contract
//!
//! Fingerprints are persisted in the remote store, so the derivation below is
//! part of the external format:
//!
//! - `TypeShape::Declared(v)` fingerprints to `v` unchanged.
//! - `TypeShape::Structure(fields)` fingerprints to the first 8 bytes
//!   (big-endian, read as `i64`) of SHA-256 over the domain string
//!   `shapecache/v1\0`, the type name, and every field in declaration order.
//!   A field contributes its name and type name, each preceded by its byte
//!   length as a big-endian `u32`, then a kind byte: `0` for a plain field,
//!   or `1` followed by the nested type's own fingerprint (big-endian `i64`)
//!   for a field declared with [`TypeShape::nested`].
//! - `TypeShape::Opaque` has no fingerprint.
//!
//! Nested fingerprints fold in recursively, so a shape change anywhere below
//! a type changes that type's fingerprint.

use std::any::TypeId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Cacheable, CodecError, CodecResult};

/// Domain separator hashed in front of every structural fingerprint.
const FINGERPRINT_DOMAIN: &[u8] = b"shapecache/v1\0";

/// Numeric identifier of a type's serializable shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(i64);

impl Fingerprint {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One declared field of a structural shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldShape {
    pub name: Cow<'static, str>,
    pub type_name: Cow<'static, str>,
    /// Shape of a nested cacheable type, folded into the parent fingerprint.
    pub nested: Option<Box<TypeShape>>,
}

/// Declared serializable shape of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeShape {
    /// Ordered field list; any rename, reorder, retype, addition or removal
    /// changes the fingerprint.
    Structure(Vec<FieldShape>),
    /// Explicit version number, bumped by hand when the shape changes.
    Declared(i64),
    /// The type advertises no stable structural identity.
    Opaque,
}

impl TypeShape {
    /// Start an empty structural shape.
    pub fn structure() -> Self {
        Self::Structure(Vec::new())
    }

    /// Shape identified by an explicit version.
    pub fn declared(version: i64) -> Self {
        Self::Declared(version)
    }

    /// Append a field. Has no effect on declared or opaque shapes.
    pub fn field(
        mut self,
        name: impl Into<Cow<'static, str>>,
        type_name: impl Into<Cow<'static, str>>,
    ) -> Self {
        if let Self::Structure(fields) = &mut self {
            fields.push(FieldShape {
                name: name.into(),
                type_name: type_name.into(),
                nested: None,
            });
        }
        self
    }

    /// Append a field holding another cacheable type, plain or `Versioned`.
    ///
    /// The nested type's fingerprint becomes part of this shape's
    /// fingerprint. `T::shape()` is evaluated here, so a type must not nest
    /// itself.
    pub fn nested<T: Cacheable>(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        if let Self::Structure(fields) = &mut self {
            fields.push(FieldShape {
                name: name.into(),
                type_name: Cow::Borrowed(T::TYPE_NAME),
                nested: Some(Box::new(T::shape())),
            });
        }
        self
    }
}

/// Compute the fingerprint of a shape. Pure: no memoization.
pub fn compute_fingerprint(type_name: &str, shape: &TypeShape) -> CodecResult<Fingerprint> {
    match shape {
        TypeShape::Declared(version) => Ok(Fingerprint(*version)),
        TypeShape::Opaque => Err(CodecError::NotSerializable {
            type_name: type_name.to_string(),
            reason: "type declares no stable structural identity".to_string(),
        }),
        TypeShape::Structure(fields) => {
            let mut hasher = Sha256::new();
            hasher.update(FINGERPRINT_DOMAIN);
            update_str(&mut hasher, type_name);
            for field in fields {
                update_str(&mut hasher, &field.name);
                update_str(&mut hasher, &field.type_name);
                match &field.nested {
                    None => hasher.update([0u8]),
                    Some(nested) => {
                        let inner = compute_fingerprint(&field.type_name, nested)?;
                        hasher.update([1u8]);
                        hasher.update(inner.as_i64().to_be_bytes());
                    }
                }
            }
            let digest = hasher.finalize();
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            Ok(Fingerprint(i64::from_be_bytes(head)))
        }
    }
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u32).to_be_bytes());
    hasher.update(value.as_bytes());
}

static GLOBAL_REGISTRY: Lazy<Arc<FingerprintRegistry>> =
    Lazy::new(|| Arc::new(FingerprintRegistry::new()));

/// Memoized, thread-safe map from type to fingerprint.
///
/// Concurrent callers for an unseen type may each compute the fingerprint,
/// but only the first published value is retained and every caller receives
/// that value. Failures are not memoized.
#[derive(Debug, Default)]
pub struct FingerprintRegistry {
    memo: RwLock<HashMap<TypeId, Fingerprint>>,
}

impl FingerprintRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry. Lives until process exit.
    pub fn global() -> Arc<FingerprintRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Fingerprint of `T`, computed on first use.
    pub fn fingerprint_of<T: Cacheable>(&self) -> CodecResult<Fingerprint> {
        let type_id = TypeId::of::<T>();
        if let Some(found) = self
            .memo
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
        {
            return Ok(*found);
        }

        let computed = compute_fingerprint(T::TYPE_NAME, &T::shape())?;
        let mut memo = self.memo.write().unwrap_or_else(PoisonError::into_inner);
        let published = *memo.entry(type_id).or_insert(computed);
        tracing::debug!(
            type_name = T::TYPE_NAME,
            fingerprint = published.as_i64(),
            "Fingerprint registered"
        );
        Ok(published)
    }

    /// Whether `T` has been fingerprinted by this registry.
    pub fn contains<T: Cacheable>(&self) -> bool {
        self.memo
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<T>())
    }

    /// Number of memoized types.
    pub fn len(&self) -> usize {
        self.memo.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every memoized fingerprint.
    pub fn reset(&self) {
        self.memo
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::Barrier;

    #[derive(Debug, Serialize, Deserialize)]
    struct Order {
        id: u64,
        amount: i64,
    }

    impl Cacheable for Order {
        const TYPE_NAME: &'static str = "shop.Order";

        fn shape() -> TypeShape {
            TypeShape::structure().field("id", "u64").field("amount", "i64")
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Ticket;

    impl Cacheable for Ticket {
        const TYPE_NAME: &'static str = "support.Ticket";

        fn shape() -> TypeShape {
            TypeShape::Opaque
        }
    }

    fn order_shape() -> TypeShape {
        TypeShape::structure().field("id", "u64").field("amount", "i64")
    }

    #[test]
    fn test_declared_version_is_fingerprint() {
        let fp = compute_fingerprint("x", &TypeShape::declared(42)).unwrap();
        assert_eq!(fp, Fingerprint::new(42));
    }

    #[test]
    fn test_structural_fingerprint_is_deterministic() {
        let a = compute_fingerprint("shop.Order", &order_shape()).unwrap();
        let b = compute_fingerprint("shop.Order", &order_shape()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_structural_changes_change_fingerprint() {
        let base = compute_fingerprint("shop.Order", &order_shape()).unwrap();

        let added = order_shape().field("currency", "string");
        let reordered = TypeShape::structure()
            .field("amount", "i64")
            .field("id", "u64");
        let retyped = TypeShape::structure().field("id", "u64").field("amount", "f64");
        let renamed = TypeShape::structure().field("id", "u64").field("total", "i64");

        for shape in [added, reordered, retyped, renamed] {
            assert_ne!(compute_fingerprint("shop.Order", &shape).unwrap(), base);
        }
        assert_ne!(compute_fingerprint("shop.Invoice", &order_shape()).unwrap(), base);
    }

    #[test]
    fn test_length_prefix_prevents_boundary_collisions() {
        let a = TypeShape::structure().field("ab", "c");
        let b = TypeShape::structure().field("a", "bc");
        assert_ne!(
            compute_fingerprint("t", &a).unwrap(),
            compute_fingerprint("t", &b).unwrap()
        );
    }

    #[test]
    fn test_nested_shape_change_changes_parent() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Line;

        impl Cacheable for Line {
            const TYPE_NAME: &'static str = "shop.Line";

            fn shape() -> TypeShape {
                TypeShape::structure().field("sku", "string")
            }
        }

        #[derive(Debug, Serialize, Deserialize)]
        struct LineV2;

        impl Cacheable for LineV2 {
            const TYPE_NAME: &'static str = "shop.Line";

            fn shape() -> TypeShape {
                TypeShape::structure()
                    .field("sku", "string")
                    .field("qty", "u32")
            }
        }

        let v1 = TypeShape::structure().nested::<Line>("line");
        let v2 = TypeShape::structure().nested::<LineV2>("line");
        let named_only = TypeShape::structure().field("line", "shop.Line");

        let fp1 = compute_fingerprint("shop.Cart", &v1).unwrap();
        assert_ne!(fp1, compute_fingerprint("shop.Cart", &v2).unwrap());
        assert_ne!(fp1, compute_fingerprint("shop.Cart", &named_only).unwrap());
    }

    #[test]
    fn test_nested_opaque_fails_parent() {
        let shape = TypeShape::structure().nested::<Ticket>("ticket");
        let err = compute_fingerprint("support.Queue", &shape).unwrap_err();
        assert!(matches!(err, CodecError::NotSerializable { ref type_name, .. } if type_name == "support.Ticket"));
    }

    #[test]
    fn test_field_ignored_on_declared_shape() {
        let shape = TypeShape::declared(3).field("id", "u64");
        assert_eq!(shape, TypeShape::Declared(3));
    }

    #[test]
    fn test_opaque_is_not_serializable() {
        let registry = FingerprintRegistry::new();
        let err = registry.fingerprint_of::<Ticket>().unwrap_err();
        assert!(matches!(err, CodecError::NotSerializable { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_memoizes_and_resets() {
        let registry = FingerprintRegistry::new();
        assert!(!registry.contains::<Order>());

        let first = registry.fingerprint_of::<Order>().unwrap();
        let second = registry.fingerprint_of::<Order>().unwrap();
        assert_eq!(first, second);
        assert!(registry.contains::<Order>());
        assert_eq!(registry.len(), 1);

        registry.reset();
        assert!(registry.is_empty());
        assert_eq!(registry.fingerprint_of::<Order>().unwrap(), first);
    }

    #[test]
    fn test_separate_registries_agree() {
        let a = FingerprintRegistry::new().fingerprint_of::<Order>().unwrap();
        let b = FingerprintRegistry::new().fingerprint_of::<Order>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_concurrent_first_computation_converges() {
        let registry = Arc::new(FingerprintRegistry::new());
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.fingerprint_of::<Order>().unwrap()
                })
            })
            .collect();

        let results: Vec<Fingerprint> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_fingerprint_display_is_decimal() {
        assert_eq!(Fingerprint::new(-17).to_string(), "-17");
        assert_eq!(Fingerprint::new(9).as_i64(), 9);
    }
}
