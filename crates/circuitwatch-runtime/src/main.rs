//! circuitwatch: circuit safety state and group presence runtime binary.
//! Polls the cloud, listens to relayed beacon frames, and streams the
//! arbitrated, offline-first result.

use clap::Parser;

mod cli;
mod cmd_cache;
mod cmd_run;
mod cmd_share;
mod context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("CIRCUITWATCH_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let ctx = context::Context::from_cli(&args)?;

    match args.command {
        cli::Command::Run(opts) => {
            tracing::info!("circuitwatch starting");
            cmd_run::cmd_run(ctx, opts).await?;
        }
        cli::Command::Status => cmd_cache::cmd_status(&ctx).await?,
        cli::Command::CacheAge => cmd_cache::cmd_cache_age(&ctx).await?,
        cli::Command::ClearCache => cmd_cache::cmd_clear_cache(&ctx).await?,
        cli::Command::Share(opts) => cmd_share::cmd_share(&ctx, opts).await?,
    }

    Ok(())
}
