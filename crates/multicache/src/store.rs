//! Storage backends for named caches.
//!
//! Stores hold typed entries behind type erasure: a [`CacheKey`] compares and
//! hashes through the original key's own `Eq` and `Hash`, and a
//! [`StoredValue`] is the value itself, shared rather than re-encoded.

use std::any::{type_name, Any, TypeId};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::config::CacheSpec;

/// Cache entry as held by a store.
pub type StoredValue = Arc<dyn Any + Send + Sync>;

/// Object-safe view of a key type.
///
/// Implemented for every `Eq + Hash` type that can be shared across
/// threads. Keys of different types are never equal.
pub trait DynKey: Any + Send + Sync {
    /// The key as `Any`, for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Equality through the concrete type's `Eq`.
    fn dyn_eq(&self, other: &dyn DynKey) -> bool;

    /// Hash through the concrete type's `Hash`, salted with its type.
    fn dyn_hash(&self, state: &mut dyn Hasher);

    /// Name of the concrete key type.
    fn key_type_name(&self) -> &'static str;
}

impl<K> DynKey for K
where
    K: Eq + Hash + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynKey) -> bool {
        other
            .as_any()
            .downcast_ref::<K>()
            .is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<K>().hash(&mut state);
        self.hash(&mut state);
    }

    fn key_type_name(&self) -> &'static str {
        type_name::<K>()
    }
}

impl PartialEq for dyn DynKey {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}

impl Eq for dyn DynKey {}

impl Hash for dyn DynKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dyn_hash(state);
    }
}

/// Owned, type-erased cache key.
///
/// Borrows as `dyn DynKey`, so stores can be probed with `&K` without
/// allocating.
#[derive(Clone)]
pub struct CacheKey(Arc<dyn DynKey>);

impl CacheKey {
    /// Erase a key.
    pub fn new<K>(key: K) -> Self
    where
        K: Eq + Hash + Send + Sync + 'static,
    {
        Self(Arc::new(key))
    }

    fn erased(&self) -> &dyn DynKey {
        &*self.0
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.erased().dyn_eq(other.erased())
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.erased().dyn_hash(state);
    }
}

impl Borrow<dyn DynKey> for CacheKey {
    fn borrow(&self) -> &(dyn DynKey + 'static) {
        &*self.0
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey")
            .field(&self.erased().key_type_name())
            .finish()
    }
}

/// Storage engine behind a [`CacheHandle`](crate::CacheHandle).
///
/// Implementations must be safe to call from many threads at once; eviction
/// and expiry are entirely theirs.
pub trait CacheStore: Send + Sync {
    /// Get an entry, or `None` if absent or expired.
    fn get(&self, key: &dyn DynKey) -> Option<StoredValue>;

    /// Insert or overwrite an entry.
    fn put(&self, key: CacheKey, value: StoredValue);

    /// Remove an entry.
    fn invalidate(&self, key: &dyn DynKey);

    /// Remove every entry.
    fn invalidate_all(&self);

    /// Approximate number of live entries.
    fn entry_count(&self) -> u64;
}

/// Bounded, expiring in-memory store backed by `moka`.
#[derive(Clone)]
pub struct MokaStore {
    inner: moka::sync::Cache<CacheKey, StoredValue>,
}

impl MokaStore {
    /// Build a store honouring the declared size and expiry.
    pub fn new(spec: &CacheSpec) -> Self {
        let mut builder = moka::sync::Cache::builder()
            .max_capacity(spec.max_size)
            .time_to_live(spec.expire_after_write());

        if let Some(tti) = spec.expire_after_access() {
            builder = builder.time_to_idle(tti);
        }

        Self {
            inner: builder.build(),
        }
    }
}

impl fmt::Debug for MokaStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MokaStore")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

impl CacheStore for MokaStore {
    fn get(&self, key: &dyn DynKey) -> Option<StoredValue> {
        self.inner.get(key)
    }

    fn put(&self, key: CacheKey, value: StoredValue) {
        self.inner.insert(key, value);
    }

    fn invalidate(&self, key: &dyn DynKey) {
        self.inner.invalidate(key);
    }

    fn invalidate_all(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }

    fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}
