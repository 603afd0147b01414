//! chronod worker binary.
//!
//! `chronod serve` runs the worker over the process-wide registry and
//! exposes the dashboard API. SIGTERM/SIGINT trigger a bounded graceful
//! shutdown, after which the process exits 0.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use chronod_api::config;
use chronod_api::http::router::build_router;
use chronod_api::state::AppState;
use chronod_core::{EventBus, ExecutionEngine, Worker, registry};

#[derive(Parser)]
#[command(name = "chronod", about = "In-process cron-style job runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker with the dashboard API.
    Serve {
        /// Listen port (overrides config and the PORT variable).
        #[arg(long)]
        port: Option<u16>,
        /// Listen host (overrides config).
        #[arg(long)]
        host: Option<String>,
        /// Path to the config file.
        #[arg(long, default_value = "chronod.toml")]
        config: PathBuf,
        /// Log filter when RUST_LOG is unset (e.g. "debug").
        #[arg(long, env = "CHRONOD_LOG")]
        log: Option<String>,
        /// Export spans via OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            config,
            log,
            otel,
        } => {
            let mut tracing_config = chronod_observe::TracingConfig {
                otel,
                ..Default::default()
            };
            if let Some(filter) = log {
                tracing_config.filter = filter;
            }
            chronod_observe::init_tracing(&tracing_config)
                .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))?;

            let result = serve(port, host, &config).await;
            chronod_observe::shutdown_tracing();
            result
        }
    }
}

async fn serve(
    port_flag: Option<u16>,
    host_flag: Option<String>,
    config_path: &std::path::Path,
) -> anyhow::Result<()> {
    let mut config = config::load_config(config_path);
    if let Some(port) = port_flag {
        config.port = port;
    }
    if let Some(host) = host_flag {
        config.host = host;
    }

    let registry = registry::global();
    let bus = Arc::new(EventBus::new());
    let worker = Arc::new(Worker::new(ExecutionEngine::new(bus.clone())));

    for job in registry.get_all() {
        worker.add(job)?;
    }
    worker.start();

    let state = AppState::new(
        registry.clone(),
        worker.clone(),
        bus.clone(),
        config.history_limit,
    );
    let router = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, jobs = registry.len(), "chronod worker listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let report = worker
        .shutdown(Duration::from_millis(config.shutdown_timeout_ms))
        .await;
    if !report.interrupted.is_empty() {
        tracing::warn!(
            interrupted = report.interrupted.len(),
            "runs still outstanding at exit"
        );
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
