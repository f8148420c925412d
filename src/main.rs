//! Upstream balancer
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌───────────────────────────────────────────────┐
//!                     │                 UPSTREAM BALANCER             │
//!   Client            │  ┌──────────┐   worker 1..N   ┌────────────┐  │
//!   ──────────────────┼─▶│ listener │───────────────▶ │ dispatcher │──┼──▶ Host
//!                     │  └──────────┘                 └─────┬──────┘  │
//!                     │                                     │         │
//!                     │  ┌──────────────┐  post_process ┌────▼──────┐  │
//!                     │  │ shared store │◀──────────────│ committer │  │
//!                     │  │ pools, index │               └───────────┘  │
//!                     │  │ lock, leader │◀──── reconciler (leader) ─┐  │
//!                     │  └──────────────┘                           │  │
//!                     │                      background tick ───────┘  │
//!                     └───────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use upstream_balancer::config::loader::load_config;
use upstream_balancer::lifecycle::{signals, Shutdown};
use upstream_balancer::net::{proxy, Listener, TcpConnector};
use upstream_balancer::observability::{logging, metrics};
use upstream_balancer::{MemoryStore, Upstream, WorkerId};

#[derive(Parser)]
#[command(name = "upstream-balancer")]
#[command(about = "TCP load balancer with prioritized, health-tracked upstream pools", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Worker tasks; overrides `listener.workers`.
    #[arg(short, long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    if let Some(workers) = cli.workers {
        config.listener.workers = workers.max(1);
    }

    logging::init(&config.observability);
    tracing::info!("upstream-balancer v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        upstream = %config.upstream.id,
        bind_address = %config.listener.bind_address,
        workers = config.listener.workers,
        seed_pools = config.pools.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = Arc::new(MemoryStore::with_lock_options(config.store.lock_options()));
    let (upstream, configured) = Upstream::new(store, TcpConnector::new(), &config.upstream.id)?;
    let upstream = upstream.with_settings(config.upstream.settings());

    if !configured {
        let mut ctx = upstream.begin();
        let added = upstream.seed_pools(&mut ctx, config.pools.clone()).await?;
        tracing::info!(upstream = %upstream.id(), pools = added, "Seeded pools on first start");
    }

    let listener = Arc::new(Listener::bind(&config.listener).await?);
    let shutdown = Shutdown::new();

    let mut handles = Vec::with_capacity(config.listener.workers * 2);
    for _ in 0..config.listener.workers {
        let worker = WorkerId::new();
        handles.push(upstream.init_background_thread(worker, shutdown.subscribe()));
        handles.push(tokio::spawn(proxy::serve(
            upstream.clone(),
            Arc::clone(&listener),
            worker,
            shutdown.subscribe(),
        )));
    }

    signals::shutdown_on_signal(&shutdown).await;
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker task failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
