//! CLI command implementations.

pub mod caches;
pub mod demo;

use clap::Args;

/// Arguments for the demo command.
#[derive(Args)]
pub struct DemoArgs {
    /// Cache to read through.
    #[arg(long, default_value = multicache::config::DEFAULT_CACHE_NAME)]
    pub cache: String,

    /// Keys to look up, comma separated.
    #[arg(short, long, value_delimiter = ',', default_values_t = [1u64, 2, 3])]
    pub keys: Vec<u64>,

    /// Number of lookup rounds.
    #[arg(short, long, default_value_t = 2)]
    pub rounds: u32,

    /// Simulated loader round trip in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub latency_ms: u64,
}

/// Arguments for the caches command.
#[derive(Args)]
pub struct CachesArgs {
    /// Only show this cache.
    pub name: Option<String>,
}
