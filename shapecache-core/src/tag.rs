//! Type tags: `<type-name>%<fingerprint>`.
//!
//! The fingerprint is always the final `%`-delimited segment, so decoding
//! splits on the last `%`.

use std::fmt;
use std::sync::Arc;

use crate::{Cacheable, CodecError, CodecResult, Fingerprint, FingerprintRegistry};

/// Separator between the type name and the fingerprint.
pub const TAG_DELIMITER: char = '%';

/// Combined type identity and structural version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeTag {
    type_name: String,
    fingerprint: Fingerprint,
}

impl TypeTag {
    pub fn new(type_name: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            type_name: type_name.into(),
            fingerprint,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Parse a tag string.
    ///
    /// Fails with `MalformedTag` when no delimiter is present, the type name
    /// is empty, or the trailing segment is not a base-10 integer.
    pub fn parse(tag: &str) -> CodecResult<Self> {
        let (type_name, fingerprint) =
            tag.rsplit_once(TAG_DELIMITER)
                .ok_or_else(|| CodecError::MalformedTag {
                    tag: tag.to_string(),
                    reason: format!("missing '{}' delimiter", TAG_DELIMITER),
                })?;

        if type_name.is_empty() {
            return Err(CodecError::MalformedTag {
                tag: tag.to_string(),
                reason: "empty type name".to_string(),
            });
        }

        let fingerprint = fingerprint
            .parse::<i64>()
            .map_err(|e| CodecError::MalformedTag {
                tag: tag.to_string(),
                reason: format!("fingerprint segment {:?} is not an integer: {}", fingerprint, e),
            })?;

        Ok(Self::new(type_name, Fingerprint::new(fingerprint)))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.type_name, TAG_DELIMITER, self.fingerprint)
    }
}

/// Encodes tags for cacheable types using a fingerprint registry.
#[derive(Debug, Clone)]
pub struct TypeTagCodec {
    fingerprints: Arc<FingerprintRegistry>,
}

impl TypeTagCodec {
    pub fn new(fingerprints: Arc<FingerprintRegistry>) -> Self {
        Self { fingerprints }
    }

    pub fn fingerprints(&self) -> &Arc<FingerprintRegistry> {
        &self.fingerprints
    }

    /// Tag for `T`: canonical name, delimiter, current fingerprint.
    pub fn encode<T: Cacheable>(&self) -> CodecResult<TypeTag> {
        validate_type_name(T::TYPE_NAME)?;
        let fingerprint = self.fingerprints.fingerprint_of::<T>()?;
        Ok(TypeTag::new(T::TYPE_NAME, fingerprint))
    }

    /// Split a stored tag into type name and fingerprint.
    pub fn decode(&self, tag: &str) -> CodecResult<TypeTag> {
        TypeTag::parse(tag)
    }
}

fn validate_type_name(type_name: &str) -> CodecResult<()> {
    if type_name.is_empty() {
        return Err(CodecError::NotSerializable {
            type_name: type_name.to_string(),
            reason: "type name is empty".to_string(),
        });
    }
    if type_name.contains(TAG_DELIMITER) {
        return Err(CodecError::NotSerializable {
            type_name: type_name.to_string(),
            reason: format!("type name contains the tag delimiter '{}'", TAG_DELIMITER),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeShape;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Order {
        id: u64,
    }

    impl Cacheable for Order {
        const TYPE_NAME: &'static str = "shop.Order";

        fn shape() -> TypeShape {
            TypeShape::declared(7)
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Percent;

    impl Cacheable for Percent {
        const TYPE_NAME: &'static str = "math.100%";

        fn shape() -> TypeShape {
            TypeShape::declared(1)
        }
    }

    #[test]
    fn test_encode_concatenates_name_and_fingerprint() {
        let codec = TypeTagCodec::new(Arc::new(FingerprintRegistry::new()));
        let tag = codec.encode::<Order>().unwrap();
        assert_eq!(tag.to_string(), "shop.Order%7");
    }

    #[test]
    fn test_encode_rejects_delimiter_in_name() {
        let codec = TypeTagCodec::new(Arc::new(FingerprintRegistry::new()));
        let err = codec.encode::<Percent>().unwrap_err();
        assert!(matches!(err, CodecError::NotSerializable { .. }));
    }

    #[test]
    fn test_decode_splits_on_last_delimiter() {
        let tag = TypeTag::parse("odd%name%-12").unwrap();
        assert_eq!(tag.type_name(), "odd%name");
        assert_eq!(tag.fingerprint(), Fingerprint::new(-12));
    }

    #[test]
    fn test_decode_missing_delimiter() {
        let err = TypeTag::parse("shop.Order").unwrap_err();
        assert!(matches!(err, CodecError::MalformedTag { .. }));
    }

    #[test]
    fn test_decode_non_numeric_fingerprint() {
        for bad in ["shop.Order%", "shop.Order%abc", "shop.Order%1.5", "shop.Order%99999999999999999999"] {
            let err = TypeTag::parse(bad).unwrap_err();
            assert!(matches!(err, CodecError::MalformedTag { .. }), "{}", bad);
        }
    }

    #[test]
    fn test_decode_empty_type_name() {
        let err = TypeTag::parse("%12").unwrap_err();
        assert!(matches!(err, CodecError::MalformedTag { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Any name without the delimiter survives a display/parse cycle.
        #[test]
        fn prop_tag_parse_inverts_display(
            name in "[a-zA-Z_][a-zA-Z0-9_.:$<>]{0,40}",
            fingerprint in any::<i64>(),
        ) {
            let tag = TypeTag::new(name.clone(), Fingerprint::new(fingerprint));
            let parsed = TypeTag::parse(&tag.to_string()).unwrap();
            prop_assert_eq!(parsed.type_name(), name.as_str());
            prop_assert_eq!(parsed.fingerprint().as_i64(), fingerprint);
        }
    }
}
