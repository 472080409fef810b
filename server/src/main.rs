mod routes;
mod state;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use barista::config::{load_config, resolve_config_path};
use barista::telemetry::init_logging;
use barista::BaristaError;
use clap::Parser;
use log::{error, info};

use state::AppState;

/// BaristaCMS email inbox service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to barista.json (falls back to $BARISTA_CONFIG, then ~/.barista/barista.json).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Args::parse()).await {
        error!("barista-server failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), BaristaError> {
    let config_path = resolve_config_path(args.config.as_deref());
    let config = load_config(&config_path)?;
    init_logging(&config.logging)?;

    info!("Starting barista-server v{}", env!("CARGO_PKG_VERSION"));
    info!("Using config {}", config_path.display());

    let state = AppState::from_config(&config)?;

    let interval = state.poll_interval(config.inbox.poll_interval_minutes);
    let scheduler = Arc::clone(&state.scheduler);
    let startup = tokio::spawn(async move {
        scheduler.start(interval).await;
    });

    let host: IpAddr = config.server.host.parse().map_err(|_| {
        BaristaError::Config(barista::ConfigError::Validation {
            message: format!("invalid server.host: {}", config.server.host),
        })
    })?;
    let addr = SocketAddr::new(host, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    let scheduler = Arc::clone(&state.scheduler);
    let serve_result = axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    startup.abort();
    scheduler.stop().await;
    serve_result?;
    info!("barista-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        return;
    }
    info!("Shutdown requested");
}
