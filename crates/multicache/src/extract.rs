//! Mapping loaded values back to their cache keys.
//!
//! A batch loader returns values without saying which requested key each one
//! answers. The coordinator recovers the key from the value itself through a
//! [`KeyExtractor`]. The default, [`TaggedKeyExtractor`], reads the member
//! tagged by `#[derive(CacheKeyed)]`:
//!
//! ```rust
//! use multicache::{CacheKeyed, KeyExtractor, TaggedKeyExtractor};
//!
//! #[derive(CacheKeyed)]
//! struct Product {
//!     #[cache_key]
//!     id: u64,
//!     name: String,
//! }
//!
//! let product = Product { id: 7, name: "lamp".into() };
//! let key: u64 = TaggedKeyExtractor.extract_key(&product)?;
//! assert_eq!(key, 7);
//! # Ok::<(), multicache::CacheError>(())
//! ```
//!
//! Any `Fn(&V) -> CacheResult<K>` closure is also an extractor, which skips
//! the tag entirely.

use std::any::{type_name, Any, TypeId};
use std::fmt;

use crate::{CacheError, CacheResult};

/// Raw key read from a tagged member, before the type check.
pub type RawKey = Box<dyn Any + Send>;

/// Whether the key comes from a field or an accessor method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// A field tagged `#[cache_key]`.
    Field,
    /// A zero-argument method named by `#[cache_key(accessor = ...)]`.
    Accessor,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field => write!(f, "field"),
            Self::Accessor => write!(f, "accessor"),
        }
    }
}

/// Static description of the member that holds a value's cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMember {
    kind: MemberKind,
    name: &'static str,
    type_id: TypeId,
    type_name: &'static str,
}

impl KeyMember {
    /// Describe a tagged field of type `T`.
    pub fn field<T: Any>(name: &'static str) -> Self {
        Self {
            kind: MemberKind::Field,
            name,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Describe a tagged accessor; the key type is taken from its signature.
    pub fn accessor<S: ?Sized, R: Any>(name: &'static str, _method: fn(&S) -> R) -> Self {
        Self {
            kind: MemberKind::Accessor,
            name,
            type_id: TypeId::of::<R>(),
            type_name: type_name::<R>(),
        }
    }

    /// Field or accessor.
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    /// Member name as written in the source.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared type of the member.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the member's declared type is exactly `K`.
    pub fn is<K: Any>(&self) -> bool {
        self.type_id == TypeId::of::<K>()
    }
}

/// A value type that declares which member is its cache key.
///
/// Normally derived: `#[derive(CacheKeyed)]` with `#[cache_key]` on one field,
/// or `#[cache_key(accessor = method)]` on the type. Fields take priority
/// over the accessor. Deriving without any tag is allowed and surfaces as
/// [`CacheError::MissingCacheKeyTag`] when a key is first extracted.
pub trait CacheKeyed {
    /// The tagged member, or `None` if nothing is tagged.
    fn cache_key_member() -> Option<KeyMember>
    where
        Self: Sized;

    /// Read the tagged member's current value.
    fn read_cache_key(&self) -> Option<RawKey>;
}

/// Strategy for recovering a value's cache key.
pub trait KeyExtractor<K, V> {
    /// Extract the key of `value`.
    fn extract_key(&self, value: &V) -> CacheResult<K>;
}

impl<K, V, F> KeyExtractor<K, V> for F
where
    F: Fn(&V) -> CacheResult<K>,
{
    fn extract_key(&self, value: &V) -> CacheResult<K> {
        self(value)
    }
}

/// Extractor reading the member tagged by `#[derive(CacheKeyed)]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedKeyExtractor;

impl<K, V> KeyExtractor<K, V> for TaggedKeyExtractor
where
    K: Any,
    V: CacheKeyed,
{
    fn extract_key(&self, value: &V) -> CacheResult<K> {
        let member = V::cache_key_member().ok_or(CacheError::MissingCacheKeyTag {
            type_name: type_name::<V>(),
        })?;

        if !member.is::<K>() {
            return Err(CacheError::KeyTypeMismatch {
                type_name: type_name::<V>(),
                member: member.name(),
                expected: type_name::<K>(),
                found: member.type_name(),
            });
        }

        let raw = value
            .read_cache_key()
            .ok_or_else(|| CacheError::KeyExtraction {
                type_name: type_name::<V>(),
                member: member.name(),
                reason: format!("{} returned no value", member.kind()),
            })?;

        raw.downcast::<K>()
            .map(|key| *key)
            .map_err(|_| CacheError::KeyExtraction {
                type_name: type_name::<V>(),
                member: member.name(),
                reason: format!("{} value is not a {}", member.kind(), type_name::<K>()),
            })
    }
}
