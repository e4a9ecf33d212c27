//! `circuitwatch status` / `cache-age` / `clear-cache`.

use chrono::Utc;
use circuitwatch_runtime::offline_cache::{NETWORK_STATE_CACHE_KEY, STATE_CACHE_KEY};

use crate::context::Context;

/// Circuit-state snapshots: the arbitrated one from `run`, the direct one
/// from `status`.
const STATE_KEYS: [&str; 2] = [STATE_CACHE_KEY, NETWORK_STATE_CACHE_KEY];

/// Entry point for `circuitwatch status`: one cached read, printed as JSON.
pub async fn cmd_status(ctx: &Context) -> anyhow::Result<()> {
    let cached = ctx.status_cache().refresh().await;
    println!("{}", serde_json::to_string_pretty(&cached)?);
    Ok(())
}

/// Entry point for `circuitwatch cache-age`.
pub async fn cmd_cache_age(ctx: &Context) -> anyhow::Result<()> {
    let now = Utc::now();
    for key in STATE_KEYS {
        match ctx.state_cache(key).cache_age(now).await {
            Some(age) => println!("{key}: {age}"),
            None => println!("{key}: no snapshot"),
        }
    }
    Ok(())
}

/// Entry point for `circuitwatch clear-cache`.
pub async fn cmd_clear_cache(ctx: &Context) -> anyhow::Result<()> {
    for key in STATE_KEYS {
        ctx.state_cache(key).clear().await?;
    }
    if let Some(ref group) = ctx.group {
        ctx.roster_cache(group).clear().await?;
    }
    println!("cache cleared");
    Ok(())
}
