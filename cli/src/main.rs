//! Parking service CLI runner
//!
//! ```sh
//! # Run with default config (~/.config/parking-service/config.toml)
//! parking-service
//!
//! # Custom config path
//! parking-service --config /etc/parking-service/config.toml
//!
//! # Sweep every second
//! parking-service --sweep-interval 1
//!
//! # Validate config without starting
//! parking-service --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use parking_service::config::AppConfig;
use parking_service::server::{init_tracing, ServerHandle, ServerOptions};

/// Parking slot service: reservations, occupancy and automatic expiry.
#[derive(Parser, Debug)]
#[command(
    name = "parking-service",
    version,
    about = "Parking slot reservation and occupancy service",
    long_about = "Parking slot service: concurrency-safe reservations, \
                  check-in / check-out and automatic reservation expiry.\n\n\
                  Default config: ~/.config/parking-service/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "PARKING_CONFIG")]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override the expiry sweep interval in seconds (0 disables the sweeper).
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Validate the configuration file and exit without starting the service.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli
        .config
        .unwrap_or_else(parking_service::default_config_path);

    let loaded = AppConfig::load(&config_path);
    if cli.check {
        let config = loaded?;
        println!("✅ Configuration is valid");
        println!("   Config file    : {}", config_path.display());
        println!("   Service name   : {}", config.server.name);
        println!("   Slots          : {}", config.slots.len());
        println!("   Reservation TTL: {}s", config.reservations.default_ttl_secs);
        println!("   Sweep interval : {}s", config.expiry.sweep_interval_secs);
        println!("   Log level      : {}", config.logging.level);
        return Ok(());
    }

    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(ref e) => {
            eprintln!("Failed to load config from {}: {}", config_path.display(), e);
            eprintln!("Using default configuration.");
            AppConfig::default()
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(secs) = cli.sweep_interval {
        config.expiry.sweep_interval_secs = secs;
    }

    init_tracing(&config);
    info!("Configuration: {}", config_path.display());
    if let Some(ref level) = cli.log_level {
        info!("CLI override: log_level = {}", level);
    }
    if let Some(secs) = cli.sweep_interval {
        info!("CLI override: sweep_interval = {}s", secs);
    }

    // ── Start service ──────────────────────────────────────────
    let handle = match ServerHandle::start(ServerOptions {
        config,
        ..ServerOptions::default()
    })
    .await
    {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start: {}", e);
            return Err(e);
        }
    };

    // Install OS signal handlers (SIGTERM, SIGINT)
    handle.install_signal_handler();

    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    // Wait for shutdown signal, then clean up
    handle.wait().await;

    Ok(())
}
