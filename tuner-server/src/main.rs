//! Tuner server - Main entry point
//!
//! Serves real-time pitch detection over WebSocket. Clients stream 16 kHz
//! mono f32 audio to `/tune` and receive a JSON estimate per update.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tuner_core::TunerConfig;
use tuner_server::{build_router, AppState};

#[cfg(feature = "capture")]
mod listen;

/// Command-line arguments for tuner-server
#[derive(Parser, Debug)]
#[command(name = "tuner-server")]
#[command(about = "Real-time instrument tuner over WebSocket")]
#[command(version)]
struct Args {
    /// TOML file with analysis settings and extra tunings
    #[arg(short, long, global = true, env = "TUNER_CONFIG")]
    config: Option<PathBuf>,

    /// Analysis window length in samples
    #[arg(long, global = true, env = "TUNER_WINDOW_SIZE")]
    window_size: Option<usize>,

    /// Deviation in cents still reported as in tune
    #[arg(long, global = true, env = "TUNER_IN_TUNE_CENTS")]
    in_tune_cents: Option<f64>,

    /// Tuning selected for new sessions
    #[arg(long, global = true, env = "TUNER_DEFAULT_TUNING")]
    default_tuning: Option<String>,

    /// Port to listen on
    #[arg(short, long, global = true, default_value = "8000", env = "TUNER_PORT")]
    port: u16,

    /// Address to bind
    #[arg(short, long, global = true, default_value = "0.0.0.0", env = "TUNER_BIND")]
    bind: IpAddr,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the WebSocket endpoint (default)
    Serve,

    /// Tune from the local microphone and print estimates as JSON lines
    #[cfg(feature = "capture")]
    Listen {
        /// Instrument tuning to match against
        #[arg(short, long)]
        instrument: Option<String>,
    },
}

impl Args {
    /// Compiled defaults, then the config file, then CLI/env overrides
    fn resolve_config(&self) -> Result<TunerConfig> {
        let mut config = match &self.config {
            Some(path) => TunerConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => TunerConfig::default(),
        };
        if let Some(window_size) = self.window_size {
            config.window_size = window_size;
        }
        if let Some(cents) = self.in_tune_cents {
            config.in_tune_cents = cents;
        }
        if let Some(name) = &self.default_tuning {
            config.default_tuning = name.clone();
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tuner_server=debug,tuner_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();
    let config = args.resolve_config()?;

    match args.command {
        None | Some(Command::Serve) => serve(config, args.bind, args.port).await,
        #[cfg(feature = "capture")]
        Some(Command::Listen { instrument }) => {
            tokio::task::spawn_blocking(move || listen::run(config, instrument))
                .await
                .context("Listen task failed")?
        }
    }
}

async fn serve(config: TunerConfig, bind: IpAddr, port: u16) -> Result<()> {
    info!(
        sample_rate = config.sample_rate,
        window_size = config.window_size,
        default_tuning = %config.default_tuning,
        "Starting tuner server"
    );

    let state = AppState::new(config).context("Failed to initialize tuner")?;
    let app = build_router(state);

    let addr = SocketAddr::new(bind, port);
    info!("Starting WebSocket server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
