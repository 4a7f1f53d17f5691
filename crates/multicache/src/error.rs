//! Cache error types.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Boxed error returned by a batch loader.
pub type LoaderError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when using the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No cache is registered under the requested name.
    #[error("cache not declared: {name}")]
    CacheNotDeclared { name: String },

    /// The value type has no member tagged as its cache key.
    #[error("no #[cache_key] field or accessor on {type_name}")]
    MissingCacheKeyTag { type_name: &'static str },

    /// The tagged member's type is not the requested key type.
    #[error("cache key of {type_name} is `{member}: {found}`, expected {expected}")]
    KeyTypeMismatch {
        type_name: &'static str,
        member: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// Reading the tagged member failed.
    #[error("failed to read cache key {type_name}::{member}: {reason}")]
    KeyExtraction {
        type_name: &'static str,
        member: &'static str,
        reason: String,
    },

    /// The batch loader failed.
    #[error("loader failed: {0}")]
    Loader(#[source] LoaderError),

    /// An entry exists under the key but holds a different value type.
    #[error("cache {cache} holds a value that is not a {expected}")]
    ValueTypeMismatch {
        cache: String,
        expected: &'static str,
    },

    /// Two caches were declared with the same name.
    #[error("cache declared twice: {name}")]
    DuplicateCache { name: String },

    /// The registry configuration was rejected.
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Wrap a loader failure.
    pub fn loader(err: impl Into<LoaderError>) -> Self {
        Self::Loader(err.into())
    }

    /// Whether the error is a configuration defect in the value type or the
    /// registry rather than a failure of the loader or the store.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::CacheNotDeclared { .. }
                | Self::MissingCacheKeyTag { .. }
                | Self::KeyTypeMismatch { .. }
                | Self::KeyExtraction { .. }
                | Self::ValueTypeMismatch { .. }
                | Self::DuplicateCache { .. }
                | Self::InvalidConfig(_)
        )
    }
}
