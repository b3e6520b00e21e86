//! Microservice template entrypoint.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request      ┌──────────────────────────────────────────────┐
//!     ────────────────────┼─▶ http server ─▶ handlers                    │
//!                         │                     │                        │
//!                         │                     ▼ /upstream/{name}       │
//!                         │              circuit breaker ─▶ reqwest ─────┼──▶ Upstream
//!                         │                                              │
//!                         │  config (TOML + env)   logging   lifecycle   │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use microservice_template::config;
use microservice_template::http::HttpServer;
use microservice_template::lifecycle::{signals, Shutdown};
use microservice_template::observability::logging;
use microservice_template::resilience::{CircuitBreaker, ReqwestExecutor};

#[derive(Parser)]
#[command(name = "microservice-template")]
#[command(about = "Minimal HTTP service with circuit-breaker guarded upstream calls", long_about = None)]
struct Cli {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    logging::init(&config.observability.log_level);

    tracing::info!(
        name = %config.app.name,
        version = %config.app.version,
        environment = %config.app.environment,
        "Service starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        failure_threshold = config.breaker.failure_threshold,
        cooldown_secs = config.breaker.cooldown_secs,
        timeout_secs = config.breaker.timeout_secs,
        upstreams = config.upstreams.len(),
        "Configuration loaded"
    );

    let listener = TcpListener::bind(config.listener.bind_address()).await?;

    let breaker = Arc::new(CircuitBreaker::new(&config.breaker, ReqwestExecutor::default()));
    let server = HttpServer::with_breaker(config, breaker);

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal(&shutdown).await;
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
