//! `circuitwatch run`: run the pipeline and stream JSON lines to stdout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use circuitwatch_core::{ArbitratedState, Cached, CircuitState, GroupMemberLocation, LocalIdentity};
use circuitwatch_runtime::{Pipeline, PipelineConfig};
use circuitwatch_source_beacon::relay::run_relay;
use circuitwatch_source_beacon::{BeaconSource, ScanCoordinator};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::cli::RunOpts;
use crate::context::Context;

/// Entry point for `circuitwatch run`.
pub async fn cmd_run(ctx: Context, opts: RunOpts) -> anyhow::Result<()> {
    let beacon = BeaconSource::new();
    let scan = ScanCoordinator::new(Arc::new(beacon.clone()));

    let socket = UdpSocket::bind(&opts.relay_addr)
        .await
        .with_context(|| format!("failed to bind beacon relay on {}", opts.relay_addr))?;
    let relay_cancel = CancellationToken::new();
    let relay_handle = tokio::spawn(run_relay(socket, beacon, relay_cancel.clone()));

    let config = PipelineConfig {
        poll_interval: Duration::from_secs(opts.poll_interval),
        request_timeout: ctx.request_timeout,
        refresh_interval: Duration::from_secs(opts.refresh_interval),
        group_id: ctx.group.clone(),
        identity: LocalIdentity {
            user_id: opts.user_id,
            display_name: opts.display_name,
        },
    };
    let (mut pipeline, mut outputs) = Pipeline::start(config, ctx.cloud, &scan, ctx.store);
    let arbitrated = pipeline.arbitrated();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut presence_open = true;

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            cached = outputs.state.recv() => match cached {
                Some(cached) => {
                    let current = arbitrated.borrow().clone();
                    println!("{}", state_line(&cached, &current));
                }
                None => {
                    tracing::warn!("state stream ended unexpectedly");
                    break;
                }
            },
            cached = outputs.presence.recv(), if presence_open => match cached {
                Some(cached) => println!("{}", presence_line(&cached)),
                None => presence_open = false,
            },
        }
    }

    pipeline.stop().await;
    relay_cancel.cancel();
    if let Err(e) = relay_handle.await {
        tracing::warn!("beacon relay task failed: {e}");
    }
    Ok(())
}

/// Wait for ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            },
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}

/// One state line. `app_mode` and `origin` come from the live arbiter output,
/// so they can disagree with a stale cached `mode`.
pub(crate) fn state_line(cached: &Cached<CircuitState>, current: &ArbitratedState) -> serde_json::Value {
    serde_json::json!({
        "kind": "state",
        "mode": cached.value.mode,
        "message": cached.value.message,
        "temperature": cached.value.temperature,
        "updated_at": cached.value.updated_at,
        "session_info": cached.value.session_info,
        "freshness": cached.freshness,
        "origin": current.origin,
        "app_mode": current.app_mode,
    })
}

pub(crate) fn presence_line(cached: &Cached<Vec<GroupMemberLocation>>) -> serde_json::Value {
    serde_json::json!({
        "kind": "presence",
        "members": cached.value,
        "freshness": cached.freshness,
    })
}
