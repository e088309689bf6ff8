//! Sheepdog protocol storage gateway (sdgate).
//!
//! Terminates the sheepdog client protocol and stores objects on a set of
//! local directories, replicated over locations chosen by a weighted
//! placement ring.
//!
//! Usage:
//!   sdgate --store PATH[:WEIGHT] [--store ...] [OPTIONS]
//!
//! The daemon creates a tokio runtime and runs:
//! 1. Cluster lifecycle driver
//! 2. Client accept loop, one task per connection

mod cluster;
mod config;
mod daemon;
mod ops;
mod registry;
mod request;

use clap::Parser;
use tracing::{error, info};

use crate::config::{Args, GatewayConfig};
use crate::daemon::Gateway;
use crate::registry::Registry;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("sdgate v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match GatewayConfig::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    if !config.cluster.is_formatted() {
        info!("cluster version 0, requests will wait for format");
    }

    let registry = Registry::new(config);
    let gateway = match Gateway::start(&registry).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("failed to start gateway: {}", e);
            std::process::exit(1);
        }
    };
    info!("sdgate ready on {}", gateway.local_addr());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot wait for SIGINT: {}", e);
    } else {
        info!("SIGINT received, shutting down");
    }

    gateway.stop().await;
    info!("sdgate stopped");
}
