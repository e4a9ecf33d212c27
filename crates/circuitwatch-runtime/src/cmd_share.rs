//! `circuitwatch share`: publish the local user's location to the roster.

use anyhow::Context as _;
use chrono::Utc;
use circuitwatch_core::GroupMemberLocation;
use circuitwatch_source_cloud::RosterRepository;

use crate::cli::ShareOpts;
use crate::context::Context;

/// Entry point for `circuitwatch share`.
pub async fn cmd_share(ctx: &Context, opts: ShareOpts) -> anyhow::Result<()> {
    let Some(ref group) = ctx.group else {
        anyhow::bail!("--group (or CIRCUITWATCH_GROUP) is required to share a location");
    };
    let member = GroupMemberLocation {
        user_id: opts.user_id,
        display_name: opts.display_name,
        latitude: opts.latitude,
        longitude: opts.longitude,
        last_updated: Utc::now(),
        sharing: true,
    };

    let repo = RosterRepository::new(ctx.cloud.clone());
    repo.register_presence(group, &member)
        .await
        .with_context(|| format!("failed to share location with group {group}"))?;
    println!("location shared with {group}");
    Ok(())
}
