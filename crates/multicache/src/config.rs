//! Registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CacheError, CacheResult};

/// Name of the cache declared by [`RegistryConfig::default`].
pub const DEFAULT_CACHE_NAME: &str = "test";

/// Configuration for the whole registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Caches to declare, in order.
    #[serde(default)]
    pub caches: Vec<CacheSpec>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            caches: vec![CacheSpec::new(DEFAULT_CACHE_NAME)],
        }
    }
}

impl RegistryConfig {
    /// Create an empty configuration.
    pub fn empty() -> Self {
        Self { caches: Vec::new() }
    }

    /// Add a cache declaration.
    pub fn with_cache(mut self, spec: CacheSpec) -> Self {
        self.caches.push(spec);
        self
    }

    /// Check names are present and unique.
    pub fn validate(&self) -> CacheResult<()> {
        let mut seen = std::collections::HashSet::new();
        for spec in &self.caches {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(CacheError::DuplicateCache {
                    name: spec.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Declaration of a single named cache.
///
/// Fixed once the registry is built: name, capacity and expiry never change
/// for the lifetime of the handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSpec {
    /// Cache name used to resolve the handle.
    pub name: String,

    /// Maximum number of entries.
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    /// Seconds an entry lives after it was written.
    #[serde(default = "default_expire_after_write_secs")]
    pub expire_after_write_secs: u64,

    /// Seconds an entry lives after it was last read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after_access_secs: Option<u64>,
}

fn default_max_size() -> u64 {
    100
}

fn default_expire_after_write_secs() -> u64 {
    600
}

impl CacheSpec {
    /// Create a declaration with the default size (100) and write expiry (10 minutes).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_size: default_max_size(),
            expire_after_write_secs: default_expire_after_write_secs(),
            expire_after_access_secs: None,
        }
    }

    /// Set the maximum number of entries.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the time-to-live after write.
    pub fn with_expire_after_write(mut self, ttl: Duration) -> Self {
        self.expire_after_write_secs = ttl.as_secs();
        self
    }

    /// Set the time-to-idle after last access.
    pub fn with_expire_after_access(mut self, tti: Duration) -> Self {
        self.expire_after_access_secs = Some(tti.as_secs());
        self
    }

    /// Time-to-live after write.
    pub fn expire_after_write(&self) -> Duration {
        Duration::from_secs(self.expire_after_write_secs)
    }

    /// Time-to-idle after access, if configured.
    pub fn expire_after_access(&self) -> Option<Duration> {
        self.expire_after_access_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> CacheResult<()> {
        if self.name.trim().is_empty() {
            return Err(CacheError::InvalidConfig(
                "cache name must not be empty".to_string(),
            ));
        }
        if self.expire_after_write_secs == 0 {
            return Err(CacheError::InvalidConfig(format!(
                "cache {}: expire_after_write_secs must be positive",
                self.name
            )));
        }
        Ok(())
    }
}
