//! Argonode - proxy node bootstrap
//!
//! Starts the subscription HTTP server, then brings up the proxy engine and
//! tunnel client and publishes share links once the tunnel hostname is known.

use anyhow::{anyhow, Context, Result};
use argonode_api::{SubscriptionCache, SubscriptionServer, SubscriptionServerConfig};
use argonode_bootstrap::{Bootstrap, BootstrapReport, Settings};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "argonode")]
#[command(about = "Bootstrap a tunneled multi-protocol proxy node", long_about = None)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    info!(
        "🚀 argonode {} (commit {})",
        env!("GIT_TAG"),
        env!("GIT_HASH")
    );

    let cache = SubscriptionCache::new();
    let server_config =
        SubscriptionServerConfig::new(cli.settings.http_port(), &cli.settings.sub_path)
            .context("Invalid subscription path")?;
    let mut server = tokio::spawn(SubscriptionServer::new(server_config, cache.clone()).start());

    let bootstrap = Bootstrap::new(cli.settings, cache).run();
    tokio::pin!(bootstrap);

    // Holds the process handles for as long as the server runs
    let _node: Option<BootstrapReport> = tokio::select! {
        result = &mut server => return server_exit(result),
        result = &mut bootstrap => match result {
            Ok(report) => Some(report),
            Err(e) => {
                error!("❌ Bootstrap failed: {:#}", e);
                warn!("HTTP server keeps running without share links");
                None
            }
        },
    };

    tokio::select! {
        result = &mut server => server_exit(result),
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
    }
}

fn server_exit(result: Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.context("HTTP server stopped")),
        Err(e) => Err(anyhow!("HTTP server task failed: {}", e)),
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
