//! shapecache Core - Versioned Value Codec
//!
//! Types shared by every shapecache crate: the [`Cacheable`] trait, structural
//! [`Fingerprint`]s, [`TypeTag`]s, the [`ValueCodec`] that refuses to hand
//! back a value whose stored shape differs from the loaded type, cache
//! configuration, and the error taxonomy.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use shapecache_core::{Cacheable, CodecError, TypeShape, ValueCodec};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Order {
//!     amount: i64,
//! }
//!
//! impl Cacheable for Order {
//!     const TYPE_NAME: &'static str = "shop.Order";
//!
//!     fn shape() -> TypeShape {
//!         TypeShape::structure().field("amount", "i64")
//!     }
//! }
//!
//! let codec = ValueCodec::default();
//! let bytes = codec.serialize(&Order { amount: 10 })?;
//! assert_eq!(codec.deserialize::<Order>(&bytes)?, Order { amount: 10 });
//! # Ok::<(), CodecError>(())
//! ```

mod cacheable;
mod codec;
mod config;
mod error;
mod fingerprint;
mod registry;
mod scope;
mod tag;
mod versioned;

pub use cacheable::Cacheable;
pub use codec::ValueCodec;
pub use config::{CacheSettings, KeyPrefixPolicy, DEFAULT_KEY_DELIMITER, DEFAULT_TIME_TO_LIVE_SECS};
pub use error::{CacheError, CacheResult, CodecError, CodecResult, ConfigError, StoreError};
pub use fingerprint::{compute_fingerprint, FieldShape, Fingerprint, FingerprintRegistry, TypeShape};
pub use registry::{SubtypeDecoder, TypeRegistry};
pub use tag::{TypeTag, TypeTagCodec, TAG_DELIMITER};
pub use versioned::Versioned;
