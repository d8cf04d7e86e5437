//! TCP stream manager daemon.
//!
//! Serves an echo consumer on top of the stream manager so capacity,
//! staggering and eviction behavior can be observed with real clients.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ TcpRuntime (mio) ──▶ StreamManager ──▶ EchoService
//!                      ▲                    │
//!                      └──── turn() every tick_interval_ms
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::time::MissedTickBehavior;

use tcp_stream_manager::config::{load_config, ManagerConfig};
use tcp_stream_manager::lifecycle::{self, signals, Shutdown};
use tcp_stream_manager::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "tcp-stream-manager")]
#[command(about = "Bounded TCP stream manager serving an echo consumer", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the stream capacity.
    #[arg(long)]
    capacity: Option<usize>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ManagerConfig::default(),
    };
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(capacity) = cli.capacity.filter(|c| *c > 0) {
        config.listener.max_concurrent_streams = capacity;
    }

    logging::init_logging(&config.observability);
    tracing::info!("tcp-stream-manager v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let lifecycle::Daemon { mut manager, echo } = lifecycle::start(&config)?;

    let shutdown = Shutdown::new();
    let mut stop = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown);

    let mut ticker = tokio::time::interval(Duration::from_millis(config.io.tick_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => manager.turn(),
            _ = stop.recv() => break,
        }
    }

    let stats = manager.stats();
    let echo_stats = echo.stats();
    tracing::info!(
        accepted = stats.accepted_total,
        rejected = stats.rejected_total,
        evicted = stats.evicted_total,
        sessions = echo_stats.sessions_opened,
        bytes_echoed = echo_stats.bytes_echoed,
        "Shutting down"
    );
    manager.release();

    tracing::info!("Shutdown complete");
    Ok(())
}
