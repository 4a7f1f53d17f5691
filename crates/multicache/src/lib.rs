//! Batch cache-aside over named local caches.
//!
//! Provides:
//! - `CacheRegistry` - Named caches declared once at startup
//! - `CacheHandle` - Typed access to one cache
//! - `MultiKeyCache` - Resolve many keys at once, loading only the misses
//! - `#[derive(CacheKeyed)]` - Tag the member a loaded value is cached under
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashSet;
//! use std::convert::Infallible;
//! use std::sync::Arc;
//!
//! use multicache::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash, CacheKeyed)]
//! struct Price {
//!     #[cache_key]
//!     sku: String,
//!     cents: u64,
//! }
//!
//! let registry = CacheRegistry::builder()
//!     .cache(CacheSpec::new("prices").with_max_size(1_000))
//!     .build()?;
//! let cache = MultiKeyCache::new(Arc::new(registry));
//!
//! let prices = cache.multi_get("prices", ["a".to_string(), "b".to_string()], |skus: HashSet<String>| {
//!     // One batched lookup for every sku not cached yet.
//!     Ok::<_, Infallible>(skus.into_iter().map(|sku| Price { sku, cents: 100 }).collect())
//! })?;
//! assert_eq!(prices.len(), 2);
//! # Ok::<(), CacheError>(())
//! ```

// Lets the derive's `::multicache::` paths resolve inside this crate.
extern crate self as multicache;

pub mod config;
mod coordinator;
mod error;
mod extract;
mod handle;
mod registry;
pub mod store;

pub use config::{CacheSpec, RegistryConfig};
pub use coordinator::MultiKeyCache;
pub use error::{CacheError, CacheResult, LoaderError};
pub use extract::{CacheKeyed, KeyExtractor, KeyMember, MemberKind, RawKey, TaggedKeyExtractor};
pub use handle::{CacheHandle, CacheStatsSnapshot};
pub use registry::{CacheRegistry, CacheRegistryBuilder};
pub use store::{CacheKey, CacheStore, DynKey, MokaStore, StoredValue};

/// Derive [`CacheKeyed`] from a `#[cache_key]` tag.
pub use multicache_macros::CacheKeyed;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        CacheError, CacheHandle, CacheKeyed, CacheRegistry, CacheResult, CacheSpec,
        KeyExtractor, MultiKeyCache, RegistryConfig, TaggedKeyExtractor,
    };
}
