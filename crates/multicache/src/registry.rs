//! Registry of named caches.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::{CacheSpec, RegistryConfig};
use crate::handle::CacheHandle;
use crate::store::{CacheStore, MokaStore};
use crate::{CacheError, CacheResult};

/// Immutable map from cache name to [`CacheHandle`].
///
/// Built once at startup and shared (usually as `Arc<CacheRegistry>`) for
/// the life of the process.
///
/// # Example
///
/// ```rust
/// use multicache::{CacheRegistry, CacheSpec};
/// use std::time::Duration;
///
/// let registry = CacheRegistry::builder()
///     .cache(CacheSpec::new("products").with_expire_after_write(Duration::from_secs(60)))
///     .build()?;
///
/// assert!(registry.resolve("products").is_ok());
/// assert!(registry.resolve("orders").is_err());
/// # Ok::<(), multicache::CacheError>(())
/// ```
#[derive(Debug, Default)]
pub struct CacheRegistry {
    caches: HashMap<String, CacheHandle>,
}

impl CacheRegistry {
    /// Start declaring caches.
    pub fn builder() -> CacheRegistryBuilder {
        CacheRegistryBuilder::default()
    }

    /// Build a registry with a moka store for every declared cache.
    pub fn from_config(config: &RegistryConfig) -> CacheResult<Self> {
        config
            .caches
            .iter()
            .cloned()
            .fold(Self::builder(), CacheRegistryBuilder::cache)
            .build()
    }

    /// Look up a cache by name.
    pub fn resolve(&self, name: &str) -> CacheResult<&CacheHandle> {
        self.caches
            .get(name)
            .ok_or_else(|| CacheError::CacheNotDeclared {
                name: name.to_string(),
            })
    }

    /// Whether a cache is declared under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Declared cache names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.caches.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of declared caches.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Whether no cache is declared.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

/// Builder for [`CacheRegistry`].
#[derive(Default)]
pub struct CacheRegistryBuilder {
    entries: Vec<(CacheSpec, Option<Arc<dyn CacheStore>>)>,
}

impl CacheRegistryBuilder {
    /// Declare a cache backed by a [`MokaStore`].
    pub fn cache(mut self, spec: CacheSpec) -> Self {
        self.entries.push((spec, None));
        self
    }

    /// Declare a cache backed by a custom store.
    ///
    /// Size and expiry in `spec` are informational; the store enforces
    /// its own policy.
    pub fn store(mut self, spec: CacheSpec, store: Arc<dyn CacheStore>) -> Self {
        self.entries.push((spec, Some(store)));
        self
    }

    /// Validate the declarations and create the handles.
    pub fn build(self) -> CacheResult<CacheRegistry> {
        let config = RegistryConfig {
            caches: self.entries.iter().map(|(spec, _)| spec.clone()).collect(),
        };
        config.validate()?;

        let mut caches = HashMap::with_capacity(self.entries.len());
        for (spec, store) in self.entries {
            let store = store
                .unwrap_or_else(|| Arc::new(MokaStore::new(&spec)) as Arc<dyn CacheStore>);
            debug!(
                cache = %spec.name,
                max_size = spec.max_size,
                expire_after_write_secs = spec.expire_after_write_secs,
                "declared cache"
            );
            caches.insert(spec.name.clone(), CacheHandle::new(spec, store));
        }

        Ok(CacheRegistry { caches })
    }
}
