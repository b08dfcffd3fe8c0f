//! Log server.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                    LOG SERVER                    │
//!                 │                                                  │
//!   RPC client ───┼─▶ stats ─▶ errors ─▶ quota ─▶ admin / reflection │
//!                 │                               / registered RPCs  │
//!                 │                                      │           │
//!                 │                                      ▼           │
//!                 │                               AdminStorage       │
//!                 │                                      ▲           │
//!   Prometheus ───┼─▶ /metrics                           │           │
//!   LB probes  ───┼─▶ /healthz                 deleted tree GC       │
//!                 │                                                  │
//!                 │   lease + endpoint ───────────────────────────────┼──▶ etcd
//!                 └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use logserver::config::{load_config, validate_config, ConfigError, ServerConfig};
use logserver::discovery::{announce_self, Coordinator, EtcdCoordinator};
use logserver::observability::logging;
use logserver::storage::MemoryStorage;
use logserver::{BoxError, Error, Main, Registry, RpcServer};

#[derive(Parser)]
#[command(name = "logserver")]
#[command(about = "Log server with tree administration and service discovery", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `rpc_endpoint`.
    #[arg(long)]
    rpc_endpoint: Option<String>,

    /// Override `http_endpoint`.
    #[arg(long)]
    http_endpoint: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match configure(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("logserver: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.observability) {
        eprintln!("logserver: failed to initialize logging: {e}");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        rpc_endpoint = %config.rpc_endpoint,
        http_endpoint = ?config.http_endpoint,
        "logserver starting"
    );

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "logserver exiting");
        process::exit(1);
    }

    tracing::info!("Shutdown complete");
}

fn configure(args: &Args) -> Result<ServerConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(endpoint) = &args.rpc_endpoint {
        config.rpc_endpoint = endpoint.clone();
    }
    if let Some(endpoint) = &args.http_endpoint {
        config.http_endpoint = Some(endpoint.clone());
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

async fn run(config: ServerConfig) -> Result<(), Error> {
    let ctx = CancellationToken::new();
    let registry = Registry::with_storage(Arc::new(MemoryStorage::new()));

    let coordinator: Option<Arc<dyn Coordinator>> = if config.discovery.etcd_servers.is_empty() {
        None
    } else {
        let etcd: Arc<dyn Coordinator> = Arc::new(
            EtcdCoordinator::connect(&config.discovery.etcd_servers)
                .await
                .map_err(Error::CoordinatorConnect)?,
        );
        Some(etcd)
    };

    let cleanup = announce_self(
        &ctx,
        coordinator,
        &config.discovery.service,
        &config.rpc_endpoint,
        {
            let ctx = ctx.clone();
            move || ctx.cancel()
        },
    )
    .await?;

    let result = Main::new(config, registry, no_services)
        .with_storage_close(|| tracing::info!("Storage closed"))
        .run(ctx)
        .await;

    cleanup.run().await;
    result
}

/// The standalone server only carries the admin and reflection services.
fn no_services(_server: &mut RpcServer, _registry: &Registry) -> Result<(), BoxError> {
    Ok(())
}
