mod cli;
mod installer;
mod paths;
mod runtime;
mod session_state;

use clap::Parser;
use tracing::info;

use cli::Args;
use runtime::Runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    info!(shim_root = %args.shim_root.display(), model_root = %args.model_root.display(), "starting odmld");

    let runtime = Runtime::new(args.shim_root, args.model_root, args.cache_root, args.cache_ttl_secs);

    let class = runtime.get_estimated_performance_class().await;
    info!(?class, "estimated performance class");

    tokio::signal::ctrl_c().await?;
    info!("shutting down, flushing embedding cache");
    runtime.sync_cache().await;

    Ok(())
}
