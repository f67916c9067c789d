//! ECS smart client (v1)
//!
//! Runs discovery and health checking against a cluster and reports the
//! load balancer's view of it.
//!
//! # Architecture Overview
//!
//! ```text
//!   execute(req)
//!   ──────────▶ client ──claim──▶ load_balancer (least outstanding)
//!                 │                    ▲
//!                 │ issue              │ register / remove / evict
//!                 ▼                    │
//!   nodes ◀──── transport ◀──────── discovery (provider + daemon)
//!                                      │
//!                                      ├── GET /?endpoint  (topology)
//!                                      └── GET /?ping      (health)
//!
//!   cross-cutting: config · observability · lifecycle
//! ```

use std::path::PathBuf;

use clap::Parser;

use ecs_smart_client::config::{load_config, SmartConfig};
use ecs_smart_client::discovery::PollingDaemon;
use ecs_smart_client::observability::{logging, metrics};
use ecs_smart_client::{create_client, SmartClient};

#[derive(Parser)]
#[command(name = "ecs-smart-client")]
#[command(about = "Discover, health-check and balance across ECS nodes", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Initial host (`name` or `name:port`); repeatable, overrides the config
    #[arg(long = "host")]
    hosts: Vec<String>,

    /// Run a single refresh cycle, print host stats as JSON and exit
    #[arg(long)]
    once: bool,

    /// Log level, overrides the config
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SmartConfig::default(),
    };
    if !cli.hosts.is_empty() {
        config.initial_hosts = cli.hosts.clone();
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!("ecs-smart-client v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    if cli.once {
        let polling = config.polling.clone();
        config.polling.host_update_enabled = false;
        config.polling.health_check_enabled = false;
        let client = create_client(config)?;

        let summary = PollingDaemon::new(client.host_list_provider().clone(), polling)
            .poll_once()
            .await;
        tracing::info!(?summary, "Refresh cycle complete");
        print_stats(&client)?;
        return Ok(());
    }

    let client = create_client(config)?;
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl-C, shutting down");
    client.shutdown().await;
    print_stats(&client)?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn print_stats(client: &SmartClient) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(&client.host_stats())?);
    Ok(())
}
