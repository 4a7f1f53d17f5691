//! Named cache handle with typed access and statistics.

use std::any::type_name;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::CacheSpec;
use crate::store::{CacheKey, CacheStore};
use crate::{CacheError, CacheResult};

/// Handle to one named cache.
///
/// Keys are matched with their own `Eq` and `Hash`; values are stored as
/// they are and handed back as clones. A single store can hold any key and
/// value types. Cloning is cheap and clones share the store and statistics.
#[derive(Clone)]
pub struct CacheHandle {
    spec: Arc<CacheSpec>,
    store: Arc<dyn CacheStore>,
    stats: Arc<CacheStats>,
}

impl CacheHandle {
    /// Wrap a store under the given declaration.
    pub fn new(spec: CacheSpec, store: Arc<dyn CacheStore>) -> Self {
        Self {
            spec: Arc::new(spec),
            store,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// The cache name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// The declaration this handle was built from.
    pub fn spec(&self) -> &CacheSpec {
        &self.spec
    }

    /// Get a value from the cache.
    ///
    /// Returns `None` if the key doesn't exist or has expired. Counts a hit
    /// or a miss. An entry stored under `key` with a type other than `V` is
    /// a [`CacheError::ValueTypeMismatch`].
    pub fn get<K, V>(&self, key: &K) -> CacheResult<Option<V>>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Clone + 'static,
    {
        let Some(stored) = self.store.get(key) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        let value = stored
            .downcast_ref::<V>()
            .ok_or_else(|| CacheError::ValueTypeMismatch {
                cache: self.name().to_string(),
                expected: type_name::<V>(),
            })?;
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(value.clone()))
    }

    /// Set a value in the cache, overwriting any previous entry.
    pub fn put<K, V>(&self, key: K, value: V)
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        self.store.put(CacheKey::new(key), Arc::new(value));
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove one entry.
    pub fn invalidate<K>(&self, key: &K)
    where
        K: Eq + Hash + Send + Sync + 'static,
    {
        self.store.invalidate(key);
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) {
        self.store.invalidate_all();
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.store.entry_count()
    }

    /// Snapshot of the statistics counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn record_load(&self) {
        self.stats.loads.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle")
            .field("spec", &self.spec)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// Hit, miss, load and put counters for one cache.
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    puts: AtomicU64,
}

impl CacheStats {
    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a cache's statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Probes that found a value.
    pub hits: u64,
    /// Probes that found nothing.
    pub misses: u64,
    /// Loader invocations.
    pub loads: u64,
    /// Entries written.
    pub puts: u64,
}

impl CacheStatsSnapshot {
    /// Fraction of probes that hit (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    /// Counter deltas since an earlier snapshot.
    pub fn since(&self, earlier: &CacheStatsSnapshot) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.saturating_sub(earlier.hits),
            misses: self.misses.saturating_sub(earlier.misses),
            loads: self.loads.saturating_sub(earlier.loads),
            puts: self.puts.saturating_sub(earlier.puts),
        }
    }
}
