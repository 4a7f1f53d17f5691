//! Cache listing command.

use anyhow::{bail, Result};
use multicache::CacheSpec;

use super::CachesArgs;
use crate::context::Context;
use crate::output::format_duration;

/// Run the caches command.
pub async fn run(args: CachesArgs, ctx: &Context) -> Result<()> {
    let registry = ctx.registry()?;

    let specs: Vec<&CacheSpec> = registry
        .names()
        .into_iter()
        .filter(|name| args.name.as_deref().map_or(true, |wanted| wanted == *name))
        .map(|name| registry.resolve(name).map(|handle| handle.spec()))
        .collect::<Result<_, _>>()?;

    if let Some(name) = &args.name {
        if specs.is_empty() {
            bail!("Cache '{}' is not declared", name);
        }
    }

    if ctx.output.is_json() {
        ctx.output.json(&specs);
        return Ok(());
    }

    let source = match &ctx.source {
        Some(path) => path.display().to_string(),
        None => "built-in defaults".to_string(),
    };
    ctx.output.header(&format!("Caches ({})", source));

    if specs.is_empty() {
        ctx.output.info("No caches declared.");
        return Ok(());
    }

    let widths = [16, 10, 14, 14];
    ctx.output
        .table_row(&["NAME", "MAX SIZE", "TTL", "IDLE"], &widths);
    ctx.output.debug(&format!("{} of {} caches shown", specs.len(), registry.len()));
    for spec in specs {
        let max_size = spec.max_size.to_string();
        let ttl = format_duration(spec.expire_after_write_secs);
        let idle = spec
            .expire_after_access_secs
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string());
        ctx.output.table_row(
            &[spec.name.as_str(), max_size.as_str(), ttl.as_str(), idle.as_str()],
            &widths,
        );
    }

    Ok(())
}
