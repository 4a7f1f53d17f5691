//! Batch lookup demo.

use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use multicache::{CacheHandle, CacheKeyed, CacheStatsSnapshot, MultiKeyCache};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DemoArgs;
use crate::context::Context;
use crate::output::format_rate;

/// Value produced by the demo loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, CacheKeyed)]
pub struct ExampleResponse {
    #[cache_key]
    pub key: u64,
    pub value: u64,
    pub content: String,
}

impl ExampleResponse {
    /// Build the response the demo source holds for `key`.
    pub fn of(key: u64) -> Self {
        Self {
            key,
            value: key.saturating_add(1000),
            content: format!("{}content", key),
        }
    }
}

impl fmt::Display for ExampleResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExampleResponse(key={}, value={}, content={})",
            self.key, self.value, self.content
        )
    }
}

/// Stand-in for one batched query, e.g. `SELECT ... WHERE key IN (...)`.
async fn find_values(
    keys: HashSet<u64>,
    latency: Duration,
) -> Result<HashSet<ExampleResponse>, Infallible> {
    debug!(keys = keys.len(), "querying source");
    tokio::time::sleep(latency).await;
    Ok(keys.into_iter().map(ExampleResponse::of).collect())
}

/// Outcome of one lookup round.
#[derive(Debug, Serialize)]
pub struct RoundReport {
    pub round: u32,
    pub elapsed_ms: u64,
    pub values: Vec<ExampleResponse>,
    pub stats: CacheStatsSnapshot,
}

/// Run the demo command.
pub async fn run(args: DemoArgs, ctx: &Context) -> Result<()> {
    let coordinator = ctx.coordinator()?;
    let handle = coordinator
        .registry()
        .resolve(&args.cache)
        .with_context(|| format!("Cannot run demo against '{}'", args.cache))?
        .clone();

    ctx.output.debug(&format!("keys: {:?}", args.keys));

    let reports = run_rounds(&coordinator, &handle, &args).await?;

    if ctx.output.is_json() {
        ctx.output.json(&reports);
        return Ok(());
    }

    for report in &reports {
        ctx.output.header(&format!("Round {}", report.round));
        for value in &report.values {
            ctx.output.list_item(&value.to_string());
        }
        ctx.output.kv("hits", &report.stats.hits.to_string());
        ctx.output.kv("misses", &report.stats.misses.to_string());
        ctx.output.kv("loader calls", &report.stats.loads.to_string());
        ctx.output.kv("elapsed", &format!("{}ms", report.elapsed_ms));
    }

    let total = handle.stats();
    ctx.output.success(&format!(
        "{} rounds, hit rate {}",
        reports.len(),
        format_rate(total.hit_rate())
    ));

    Ok(())
}

/// Look the keys up `args.rounds` times, reporting per-round statistics.
pub async fn run_rounds(
    coordinator: &MultiKeyCache,
    handle: &CacheHandle,
    args: &DemoArgs,
) -> Result<Vec<RoundReport>> {
    let latency = Duration::from_millis(args.latency_ms);
    let mut reports = Vec::with_capacity(args.rounds as usize);

    for round in 1..=args.rounds {
        let before = handle.stats();
        let started = Instant::now();

        let values = coordinator
            .multi_get_async(handle.name(), args.keys.iter().copied(), |keys| {
                find_values(keys, latency)
            })
            .await
            .with_context(|| format!("Round {} failed", round))?;

        let mut values: Vec<ExampleResponse> = values.into_iter().collect();
        values.sort_by_key(|value| value.key);

        reports.push(RoundReport {
            round,
            elapsed_ms: started.elapsed().as_millis() as u64,
            values,
            stats: handle.stats().since(&before),
        });
    }

    Ok(reports)
}
