//! Type registry for polymorphic decoding.
//!
//! A value written as a concrete type can be read back through a base type
//! when the concrete type was registered as a subtype of that base. The
//! registry maps each base type to its subtypes by canonical name, and each
//! entry to a decoder that produces the base type from the stored payload.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::{Cacheable, CodecResult, Fingerprint, FingerprintRegistry};

type DecodeFn<B> = Box<dyn Fn(serde_json::Value) -> Result<B, serde_json::Error> + Send + Sync>;

/// Decoder for one registered subtype of `B`.
pub struct SubtypeDecoder<B> {
    type_name: &'static str,
    fingerprint: fn(&FingerprintRegistry) -> CodecResult<Fingerprint>,
    decode: DecodeFn<B>,
}

impl<B> SubtypeDecoder<B> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Current fingerprint of the subtype.
    pub fn fingerprint(&self, registry: &FingerprintRegistry) -> CodecResult<Fingerprint> {
        (self.fingerprint)(registry)
    }

    /// Decode a payload as the subtype and convert it to the base type.
    pub fn decode(&self, payload: serde_json::Value) -> Result<B, serde_json::Error> {
        (self.decode)(payload)
    }
}

impl<B> fmt::Debug for SubtypeDecoder<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubtypeDecoder")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

type Subtypes = HashMap<&'static str, Arc<dyn Any + Send + Sync>>;

/// Registry of subtype decoders, populated at startup.
#[derive(Default)]
pub struct TypeRegistry {
    subtypes: RwLock<HashMap<TypeId, Subtypes>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `S` as a subtype readable through `B`.
    ///
    /// Registering the same name for the same base again replaces the
    /// previous decoder.
    pub fn register_subtype<B, S>(&self, upcast: fn(S) -> B)
    where
        B: Cacheable,
        S: Cacheable,
    {
        let decoder = SubtypeDecoder::<B> {
            type_name: S::TYPE_NAME,
            fingerprint: FingerprintRegistry::fingerprint_of::<S>,
            decode: Box::new(move |payload| serde_json::from_value::<S>(payload).map(upcast)),
        };
        self.subtypes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(TypeId::of::<B>())
            .or_default()
            .insert(S::TYPE_NAME, Arc::new(decoder));
        tracing::debug!(
            base = B::TYPE_NAME,
            subtype = S::TYPE_NAME,
            "Subtype registered"
        );
    }

    /// Decoder for `type_name` under base type `B`, if registered.
    pub fn resolve<B: Cacheable>(&self, type_name: &str) -> Option<Arc<SubtypeDecoder<B>>> {
        let entry = self
            .subtypes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<B>())?
            .get(type_name)
            .map(Arc::clone)?;
        entry.downcast::<SubtypeDecoder<B>>().ok()
    }

    /// Names registered under base type `B`, sorted.
    pub fn subtypes_of<B: Cacheable>(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .subtypes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<B>())
            .map(|subtypes| subtypes.keys().copied().collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count: usize = self
            .subtypes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashMap::len)
            .sum();
        f.debug_struct("TypeRegistry")
            .field("subtypes", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeShape;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Email {
        to: String,
    }

    impl Cacheable for Email {
        const TYPE_NAME: &'static str = "notify.Email";

        fn shape() -> TypeShape {
            TypeShape::structure().field("to", "string")
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Notification {
        Email(Email),
    }

    impl Cacheable for Notification {
        const TYPE_NAME: &'static str = "notify.Notification";

        fn shape() -> TypeShape {
            TypeShape::declared(1)
        }
    }

    #[test]
    fn test_resolve_registered_subtype() {
        let registry = TypeRegistry::new();
        registry.register_subtype::<Notification, Email>(Notification::Email);

        let decoder = registry
            .resolve::<Notification>("notify.Email")
            .expect("subtype should resolve");
        assert_eq!(decoder.type_name(), "notify.Email");

        let value = decoder
            .decode(serde_json::json!({ "to": "a@b.c" }))
            .unwrap();
        assert_eq!(
            value,
            Notification::Email(Email {
                to: "a@b.c".to_string()
            })
        );

        let fingerprints = FingerprintRegistry::new();
        assert_eq!(
            decoder.fingerprint(&fingerprints).unwrap(),
            fingerprints.fingerprint_of::<Email>().unwrap()
        );
    }

    #[test]
    fn test_resolve_is_scoped_by_base_type() {
        let registry = TypeRegistry::new();
        registry.register_subtype::<Notification, Email>(Notification::Email);

        assert!(registry.resolve::<Notification>("notify.Sms").is_none());
        assert!(registry.resolve::<String>("notify.Email").is_none());
        assert_eq!(registry.subtypes_of::<Notification>(), vec!["notify.Email"]);
        assert!(registry.subtypes_of::<String>().is_empty());
    }

    #[test]
    fn test_same_name_under_two_bases() {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        enum Outbox {
            Email(Email),
        }

        impl Cacheable for Outbox {
            const TYPE_NAME: &'static str = "notify.Outbox";

            fn shape() -> TypeShape {
                TypeShape::declared(1)
            }
        }

        let registry = TypeRegistry::new();
        registry.register_subtype::<Notification, Email>(Notification::Email);
        registry.register_subtype::<Outbox, Email>(Outbox::Email);
        registry.register_subtype::<Outbox, Email>(Outbox::Email);

        let payload = serde_json::json!({ "to": "a@b.c" });
        let outbox = registry
            .resolve::<Outbox>("notify.Email")
            .expect("subtype should resolve")
            .decode(payload)
            .unwrap();
        assert!(matches!(outbox, Outbox::Email(_)));
        assert!(registry.resolve::<Notification>("notify.Email").is_some());
        assert_eq!(format!("{:?}", registry), "TypeRegistry { subtypes: 2 }");
    }
}
