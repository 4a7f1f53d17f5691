//! CLI execution context.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use multicache::{CacheRegistry, MultiKeyCache, RegistryConfig};

use crate::config;
use crate::output::Output;

/// Execution context for CLI commands.
pub struct Context {
    /// Registry configuration.
    pub config: RegistryConfig,
    /// Where the config came from, if a file.
    pub source: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
}

impl Context {
    /// Load context from config file.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let (source, config) = if let Some(path) = config_path {
            (Some(PathBuf::from(path)), config::load(path)?)
        } else {
            // Try to find config in current directory or parent directories
            match config::find(&cwd) {
                Some((path, config)) => (Some(path), config),
                None => (None, RegistryConfig::default()),
            }
        };

        Ok(Self {
            config,
            source,
            output,
        })
    }

    /// Build the registry declared by the config.
    pub fn registry(&self) -> Result<Arc<CacheRegistry>> {
        let registry =
            CacheRegistry::from_config(&self.config).context("Failed to build cache registry")?;
        Ok(Arc::new(registry))
    }

    /// Build a coordinator over a fresh registry.
    pub fn coordinator(&self) -> Result<MultiKeyCache> {
        Ok(MultiKeyCache::new(self.registry()?))
    }
}
