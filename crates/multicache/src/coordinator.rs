//! Batch cache-aside over a named cache.

use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::extract::{CacheKeyed, KeyExtractor, TaggedKeyExtractor};
use crate::handle::CacheHandle;
use crate::registry::CacheRegistry;
use crate::{CacheError, CacheResult, LoaderError};

/// Batch cache-aside coordinator.
///
/// Given a set of keys, returns the values already cached plus the values
/// loaded, in one call to a caller-supplied batch loader, for the keys that
/// were missing. Loaded values are written back before returning.
///
/// The coordinator holds nothing but the shared registry, so it can be cloned
/// freely and called from many threads at once. Concurrent calls missing the
/// same key may each run their loader; there is no request coalescing.
///
/// # Example
///
/// ```rust
/// use std::collections::HashSet;
/// use std::convert::Infallible;
/// use std::sync::Arc;
///
/// use multicache::{CacheKeyed, CacheRegistry, MultiKeyCache, RegistryConfig};
///
/// #[derive(Debug, Clone, PartialEq, Eq, Hash, CacheKeyed)]
/// struct Product {
///     #[cache_key]
///     id: u64,
///     name: String,
/// }
///
/// let registry = Arc::new(CacheRegistry::from_config(&RegistryConfig::default())?);
/// let cache = MultiKeyCache::new(registry);
///
/// // Loads 1, 2 and 3 in a single batch.
/// let products = cache.multi_get("test", [1u64, 2, 3], |ids: HashSet<u64>| {
///     Ok::<_, Infallible>(
///         ids.into_iter()
///             .map(|id| Product { id, name: format!("product {id}") })
///             .collect(),
///     )
/// })?;
/// assert_eq!(products.len(), 3);
///
/// // Served from the cache; the loader is not called.
/// let again = cache.multi_get("test", [1u64, 2, 3], |_: HashSet<u64>| {
///     Err::<HashSet<Product>, _>("should not load")
/// })?;
/// assert_eq!(again, products);
/// # Ok::<(), multicache::CacheError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MultiKeyCache {
    registry: Arc<CacheRegistry>,
}

impl MultiKeyCache {
    /// Create a coordinator over a registry.
    pub fn new(registry: Arc<CacheRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this coordinator resolves caches from.
    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    /// Get the values for `keys`, loading and caching the missing ones.
    ///
    /// The loader is called at most once, with every missing key, and never
    /// with an empty set. Keys of the loaded values are read from the member
    /// tagged by `#[derive(CacheKeyed)]`; see [`multi_get_with`](Self::multi_get_with)
    /// to supply the mapping yourself.
    ///
    /// The loader should fetch the whole set in one round trip, like a single
    /// `IN (...)` query, rather than key by key.
    pub fn multi_get<K, V, I, L, E>(
        &self,
        cache_name: &str,
        keys: I,
        loader: L,
    ) -> CacheResult<HashSet<V>>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Eq + Hash + Clone + Send + Sync + 'static + CacheKeyed,
        I: IntoIterator<Item = K>,
        L: FnOnce(HashSet<K>) -> Result<HashSet<V>, E>,
        E: Into<LoaderError>,
    {
        self.multi_get_with(cache_name, keys, loader, TaggedKeyExtractor)
    }

    /// Like [`multi_get`](Self::multi_get) with an explicit key extractor.
    ///
    /// If extracting or writing back a loaded value fails, the call returns
    /// that error; values written before it stay cached.
    pub fn multi_get_with<K, V, I, L, E, X>(
        &self,
        cache_name: &str,
        keys: I,
        loader: L,
        extractor: X,
    ) -> CacheResult<HashSet<V>>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Eq + Hash + Clone + Send + Sync + 'static,
        I: IntoIterator<Item = K>,
        L: FnOnce(HashSet<K>) -> Result<HashSet<V>, E>,
        E: Into<LoaderError>,
        X: KeyExtractor<K, V>,
    {
        let cache = self.registry.resolve(cache_name)?;
        let Partition { hits, misses } = partition(cache, keys)?;

        if misses.is_empty() {
            return Ok(hits);
        }

        start_load(cache, &misses);
        let loaded = loader(misses).map_err(CacheError::loader)?;
        finish_load(cache, hits, loaded, &extractor)
    }

    /// Async variant of [`multi_get`](Self::multi_get); the loader returns a future.
    pub async fn multi_get_async<K, V, I, L, F, E>(
        &self,
        cache_name: &str,
        keys: I,
        loader: L,
    ) -> CacheResult<HashSet<V>>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Eq + Hash + Clone + Send + Sync + 'static + CacheKeyed,
        I: IntoIterator<Item = K>,
        L: FnOnce(HashSet<K>) -> F,
        F: Future<Output = Result<HashSet<V>, E>>,
        E: Into<LoaderError>,
    {
        self.multi_get_async_with(cache_name, keys, loader, TaggedKeyExtractor)
            .await
    }

    /// Async variant of [`multi_get_with`](Self::multi_get_with).
    ///
    /// Nothing is held across the loader's await point besides the
    /// partitioned hits, so a slow loader only delays its own caller.
    pub async fn multi_get_async_with<K, V, I, L, F, E, X>(
        &self,
        cache_name: &str,
        keys: I,
        loader: L,
        extractor: X,
    ) -> CacheResult<HashSet<V>>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Eq + Hash + Clone + Send + Sync + 'static,
        I: IntoIterator<Item = K>,
        L: FnOnce(HashSet<K>) -> F,
        F: Future<Output = Result<HashSet<V>, E>>,
        E: Into<LoaderError>,
        X: KeyExtractor<K, V>,
    {
        let cache = self.registry.resolve(cache_name)?;
        let Partition { hits, misses } = partition(cache, keys)?;

        if misses.is_empty() {
            return Ok(hits);
        }

        start_load(cache, &misses);
        let loaded = loader(misses).await.map_err(CacheError::loader)?;
        finish_load(cache, hits, loaded, &extractor)
    }
}

/// Disjoint split of the requested keys.
struct Partition<K, V> {
    hits: HashSet<V>,
    misses: HashSet<K>,
}

fn partition<K, V, I>(cache: &CacheHandle, keys: I) -> CacheResult<Partition<K, V>>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Eq + Hash + Clone + 'static,
    I: IntoIterator<Item = K>,
{
    // Each distinct key is probed exactly once.
    let keys: HashSet<K> = keys.into_iter().collect();
    let requested = keys.len();

    let mut hits = HashSet::new();
    let mut misses = HashSet::new();
    for key in keys {
        match cache.get(&key)? {
            Some(value) => {
                hits.insert(value);
            }
            None => {
                misses.insert(key);
            }
        }
    }

    debug!(
        cache = cache.name(),
        requested,
        hits = hits.len(),
        misses = misses.len(),
        "partitioned keys"
    );
    Ok(Partition { hits, misses })
}

fn start_load<K>(cache: &CacheHandle, misses: &HashSet<K>) {
    info!(cache = cache.name(), misses = misses.len(), "loading keys not cached");
    cache.record_load();
}

/// Write the loaded values back and merge them into the hits.
fn finish_load<K, V, X>(
    cache: &CacheHandle,
    mut hits: HashSet<V>,
    loaded: HashSet<V>,
    extractor: &X,
) -> CacheResult<HashSet<V>>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Eq + Hash + Clone + Send + Sync + 'static,
    X: KeyExtractor<K, V>,
{
    write_back(cache, &loaded, extractor)?;
    hits.extend(loaded);
    Ok(hits)
}

fn write_back<K, V, X>(cache: &CacheHandle, loaded: &HashSet<V>, extractor: &X) -> CacheResult<()>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    X: KeyExtractor<K, V>,
{
    for value in loaded {
        let key = extractor.extract_key(value).inspect_err(|err| {
            warn!(cache = cache.name(), error = %err, "aborting write-back");
        })?;
        cache.put(key, value.clone());
    }

    debug!(cache = cache.name(), loaded = loaded.len(), "wrote back loaded values");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::convert::Infallible;
    use std::hash::Hasher;

    use super::*;
    use crate::{CacheKeyed, CacheSpec, RegistryConfig};

    #[derive(Debug, Clone, PartialEq, Eq, Hash, CacheKeyed)]
    struct Response {
        #[cache_key]
        key: u64,
        value: u64,
        content: String,
    }

    impl Response {
        fn of(key: u64) -> Self {
            Self {
                key,
                value: key + 1000,
                content: format!("{}content", key),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Hash, CacheKeyed)]
    struct Untagged {
        id: u64,
    }

    /// Stock-keeping code compared without regard to case.
    #[derive(Debug, Clone)]
    struct Sku(String);

    impl PartialEq for Sku {
        fn eq(&self, other: &Self) -> bool {
            self.0.eq_ignore_ascii_case(&other.0)
        }
    }

    impl Eq for Sku {}

    impl Hash for Sku {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.0.to_ascii_lowercase().hash(state);
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Hash, CacheKeyed)]
    struct Listing {
        #[cache_key]
        sku: Sku,
        title: String,
    }

    /// Carries a field its serialized form drops.
    #[derive(
        Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, CacheKeyed,
    )]
    struct Stamped {
        #[cache_key]
        id: u64,
        #[serde(skip)]
        loaded_by: u32,
    }

    fn coordinator() -> MultiKeyCache {
        let registry = CacheRegistry::from_config(&RegistryConfig::default()).unwrap();
        MultiKeyCache::new(Arc::new(registry))
    }

    fn load(keys: HashSet<u64>) -> Result<HashSet<Response>, Infallible> {
        Ok(keys.into_iter().map(Response::of).collect())
    }

    fn never(_: HashSet<u64>) -> Result<HashSet<Response>, String> {
        Err("loader must not be called".to_string())
    }

    fn responses(keys: &[u64]) -> HashSet<Response> {
        keys.iter().copied().map(Response::of).collect()
    }

    fn stats(cache: &MultiKeyCache) -> crate::CacheStatsSnapshot {
        cache.registry().resolve("test").unwrap().stats()
    }

    #[test]
    fn test_all_miss_then_all_hit() {
        let cache = coordinator();
        let calls = RefCell::new(Vec::new());

        let first = cache
            .multi_get("test", [1u64, 2, 3], |keys| {
                calls.borrow_mut().push(keys.clone());
                load(keys)
            })
            .unwrap();
        assert_eq!(first, responses(&[1, 2, 3]));
        assert_eq!(*calls.borrow(), vec![HashSet::from([1, 2, 3])]);

        let second = cache.multi_get("test", [1u64, 2, 3], never).unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn test_partial_hit_loads_only_misses() {
        let cache = coordinator();
        cache
            .registry()
            .resolve("test")
            .unwrap()
            .put(2u64, Response::of(2));

        let requested = RefCell::new(None);
        let result = cache
            .multi_get("test", [1u64, 2, 3], |keys| {
                *requested.borrow_mut() = Some(keys.clone());
                load(keys)
            })
            .unwrap();

        assert_eq!(*requested.borrow(), Some(HashSet::from([1, 3])));
        assert_eq!(result, responses(&[1, 2, 3]));
    }

    #[test]
    fn test_cached_value_wins_over_fresh_source() {
        let cache = coordinator();
        let stale = Response {
            key: 2,
            value: 0,
            content: "cached".to_string(),
        };
        cache
            .registry()
            .resolve("test")
            .unwrap()
            .put(2u64, stale.clone());

        let result = cache.multi_get("test", [2u64], never).unwrap();
        assert_eq!(result, HashSet::from([stale]));
    }

    #[test]
    fn test_empty_keys_never_load() {
        let cache = coordinator();
        let result = cache.multi_get("test", Vec::<u64>::new(), never).unwrap();

        assert!(result.is_empty());
        assert_eq!(stats(&cache), Default::default());
    }

    #[test]
    fn test_duplicate_keys_probed_once() {
        let cache = coordinator();
        let requested = RefCell::new(None);

        let result = cache
            .multi_get("test", [1u64, 1, 2, 2, 2], |keys| {
                *requested.borrow_mut() = Some(keys.clone());
                load(keys)
            })
            .unwrap();

        assert_eq!(*requested.borrow(), Some(HashSet::from([1, 2])));
        assert_eq!(result.len(), 2);
        assert_eq!(stats(&cache).misses, 2);
    }

    #[test]
    fn test_partition_is_strict_split() {
        let cache = coordinator();
        cache.multi_get("test", [1u64, 2], load).unwrap();

        let handle = cache.registry().resolve("test").unwrap();
        let split: Partition<u64, Response> = partition(handle, [1u64, 2, 3, 4]).unwrap();

        let hit_keys: HashSet<u64> = split.hits.iter().map(|r| r.key).collect();
        assert!(hit_keys.is_disjoint(&split.misses));
        assert_eq!(hit_keys, HashSet::from([1, 2]));
        assert_eq!(split.misses, HashSet::from([3, 4]));
    }

    #[test]
    fn test_loader_returns_fewer_values() {
        let cache = coordinator();
        let result = cache
            .multi_get("test", [1u64, 2, 3], |_| load(HashSet::from([1])))
            .unwrap();
        assert_eq!(result, responses(&[1]));

        // Keys that did not exist are still misses next time.
        let requested = RefCell::new(None);
        cache
            .multi_get("test", [1u64, 2, 3], |keys| {
                *requested.borrow_mut() = Some(keys.clone());
                load(HashSet::new())
            })
            .unwrap();
        assert_eq!(*requested.borrow(), Some(HashSet::from([2, 3])));
    }

    #[test]
    fn test_unrequested_values_are_cached_and_returned() {
        let cache = coordinator();
        let result = cache
            .multi_get("test", [1u64], |_| load(HashSet::from([1, 99])))
            .unwrap();
        assert_eq!(result, responses(&[1, 99]));

        let later = cache.multi_get("test", [99u64], never).unwrap();
        assert_eq!(later, responses(&[99]));
    }

    #[test]
    fn test_values_sharing_a_key_are_all_returned() {
        let cache = coordinator();
        let a = Response {
            key: 1,
            value: 1,
            content: "a".to_string(),
        };
        let b = Response {
            key: 1,
            value: 2,
            content: "b".to_string(),
        };
        let loaded = HashSet::from([a.clone(), b.clone()]);

        let result = cache
            .multi_get("test", [1u64], |_| Ok::<_, Infallible>(loaded))
            .unwrap();
        assert_eq!(result, HashSet::from([a.clone(), b.clone()]));

        let cached = cache.multi_get("test", [1u64], never).unwrap();
        assert_eq!(cached.len(), 1);
        assert!(cached.contains(&a) || cached.contains(&b));
    }

    #[test]
    fn test_unknown_cache_fails_before_loading() {
        let cache = coordinator();
        let called = RefCell::new(false);

        let result = cache.multi_get("nonexistent", [1u64], |keys| {
            *called.borrow_mut() = true;
            load(keys)
        });

        assert!(matches!(
            result,
            Err(CacheError::CacheNotDeclared { name }) if name == "nonexistent"
        ));
        assert!(!*called.borrow());
    }

    #[test]
    fn test_loader_error_propagates() {
        let cache = coordinator();
        let result = cache.multi_get("test", [1u64], never);

        match result {
            Err(CacheError::Loader(source)) => {
                assert_eq!(source.to_string(), "loader must not be called");
            }
            other => panic!("expected loader error, got {:?}", other),
        }
        assert_eq!(stats(&cache).loads, 1);
        assert_eq!(stats(&cache).puts, 0);
    }

    #[test]
    fn test_missing_tag_aborts() {
        let cache = coordinator();
        let result = cache.multi_get("test", [1u64], |keys: HashSet<u64>| {
            Ok::<_, Infallible>(keys.into_iter().map(|id| Untagged { id }).collect())
        });
        assert!(matches!(result, Err(CacheError::MissingCacheKeyTag { .. })));
    }

    #[test]
    fn test_key_type_mismatch_aborts() {
        let cache = coordinator();
        let result = cache.multi_get("test", ["1".to_string()], |_| load(HashSet::from([1])));
        assert!(matches!(result, Err(CacheError::KeyTypeMismatch { .. })));
    }

    #[test]
    fn test_failed_write_back_keeps_earlier_puts() {
        let cache = coordinator();
        let calls = Cell::new(0);
        let extractor = |value: &Response| -> CacheResult<u64> {
            calls.set(calls.get() + 1);
            if calls.get() == 2 {
                return Err(CacheError::KeyExtraction {
                    type_name: "Response",
                    member: "key",
                    reason: "refused".to_string(),
                });
            }
            Ok(value.key)
        };

        let result = cache.multi_get_with("test", [1u64, 2, 3], load, extractor);
        assert!(matches!(result, Err(CacheError::KeyExtraction { .. })));
        assert_eq!(calls.get(), 2);

        // The value written before the failure stays cached.
        assert_eq!(stats(&cache).puts, 1);
        let handle = cache.registry().resolve("test").unwrap();
        let cached = [1u64, 2, 3]
            .iter()
            .filter(|key| handle.get::<_, Response>(*key).unwrap().is_some())
            .count();
        assert_eq!(cached, 1);
    }

    #[test]
    fn test_equal_keys_hit_whatever_their_spelling() {
        let cache = coordinator();
        let loads = Cell::new(0);
        let load_listings = |skus: HashSet<Sku>| {
            loads.set(loads.get() + 1);
            Ok::<_, Infallible>(
                skus.into_iter()
                    .map(|sku| Listing {
                        title: format!("listing {}", sku.0),
                        sku,
                    })
                    .collect::<HashSet<_>>(),
            )
        };

        let first = cache
            .multi_get("test", [Sku("ABC".to_string())], load_listings)
            .unwrap();
        let second = cache
            .multi_get("test", [Sku("abc".to_string())], load_listings)
            .unwrap();

        assert_eq!(loads.get(), 1);
        assert_eq!(second, first);
        assert_eq!(second.iter().next().unwrap().title, "listing ABC");
    }

    #[test]
    fn test_cached_values_are_returned_as_loaded() {
        let cache = coordinator();
        let first = cache
            .multi_get("test", [1u64], |ids: HashSet<u64>| {
                Ok::<_, Infallible>(
                    ids.into_iter()
                        .map(|id| Stamped { id, loaded_by: 7 })
                        .collect::<HashSet<_>>(),
                )
            })
            .unwrap();

        let second = cache
            .multi_get("test", [1u64], |_: HashSet<u64>| {
                Err::<HashSet<Stamped>, _>("already cached")
            })
            .unwrap();

        assert_eq!(second, first);
        assert_eq!(second, HashSet::from([Stamped { id: 1, loaded_by: 7 }]));
    }

    #[test]
    fn test_custom_extractor() {
        let cache = coordinator();
        let by_value = |value: &Response| -> CacheResult<u64> { Ok(value.value) };

        cache.multi_get_with("test", [1u64], load, by_value).unwrap();

        // Stored under the extracted key, not the requested one.
        let handle = cache.registry().resolve("test").unwrap();
        assert_eq!(handle.get::<_, Response>(&1001u64).unwrap(), Some(Response::of(1)));
        assert_eq!(handle.get::<_, Response>(&1u64).unwrap(), None);
    }

    #[test]
    fn test_stats_track_hits_misses_and_loads() {
        let cache = coordinator();
        cache.multi_get("test", [1u64, 2], load).unwrap();
        cache.multi_get("test", [1u64, 2, 3], load).unwrap();

        let stats = stats(&cache);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.loads, 2);
        assert_eq!(stats.puts, 3);
    }

    #[test]
    fn test_separate_caches_do_not_share_entries() {
        let registry = CacheRegistry::builder()
            .cache(CacheSpec::new("a"))
            .cache(CacheSpec::new("b"))
            .build()
            .unwrap();
        let cache = MultiKeyCache::new(Arc::new(registry));

        cache.multi_get("a", [1u64], load).unwrap();
        let loaded = RefCell::new(false);
        cache
            .multi_get("b", [1u64], |keys| {
                *loaded.borrow_mut() = true;
                load(keys)
            })
            .unwrap();
        assert!(*loaded.borrow());
    }

    #[test]
    fn test_concurrent_overlapping_calls() {
        let cache = coordinator();

        std::thread::scope(|scope| {
            for offset in 0..8u64 {
                let cache = cache.clone();
                scope.spawn(move || {
                    let keys: Vec<u64> = (offset..offset + 10).collect();
                    let result = cache.multi_get("test", keys.clone(), load).unwrap();
                    assert_eq!(result, responses(&keys));
                });
            }
        });

        let all: Vec<u64> = (0..17).collect();
        let result = cache.multi_get("test", all.clone(), never).unwrap();
        assert_eq!(result, responses(&all));
    }

    #[tokio::test]
    async fn test_async_all_miss_then_all_hit() {
        let cache = coordinator();

        let first = cache
            .multi_get_async("test", [1u64, 2, 3], |keys| async move {
                tokio::task::yield_now().await;
                load(keys)
            })
            .await
            .unwrap();
        assert_eq!(first, responses(&[1, 2, 3]));

        let second = cache
            .multi_get_async("test", [1u64, 2, 3], |keys| async move { never(keys) })
            .await
            .unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_async_partial_hit() {
        let cache = coordinator();
        cache.multi_get("test", [2u64], load).unwrap();

        let result = cache
            .multi_get_async("test", [1u64, 2, 3], |keys| async move {
                assert_eq!(keys, HashSet::from([1, 3]));
                load(keys)
            })
            .await
            .unwrap();
        assert_eq!(result, responses(&[1, 2, 3]));
    }

    #[tokio::test]
    async fn test_async_empty_and_unknown() {
        let cache = coordinator();

        let empty = cache
            .multi_get_async("test", Vec::<u64>::new(), |keys| async move { never(keys) })
            .await
            .unwrap();
        assert!(empty.is_empty());

        let unknown = cache
            .multi_get_async("nonexistent", [1u64], |keys| async move { never(keys) })
            .await;
        assert!(matches!(unknown, Err(CacheError::CacheNotDeclared { .. })));
    }
}
