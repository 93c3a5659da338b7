//! Tessera Server Binary
//!
//! JSON:API server over an in-memory content store.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use clap::Parser;
use std::net::SocketAddr;
use tessera_server::{create_router, AppState, ServerConfig};
use tokio::signal;

#[derive(Parser)]
#[command(name = "tessera-server")]
#[command(about = "Tessera JSON:API Server")]
struct Args {
    /// TOML configuration file (schema, roles, API settings)
    #[arg(short, long)]
    config: Option<String>,

    /// Host to bind to (overrides the config file)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// JSON file of content items to seed the store with
    #[arg(short, long)]
    data: Option<String>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match ServerConfig::from_file(path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to load configuration from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("No configuration file given, serving an empty schema");
            ServerConfig::default()
        }
    };

    let mut config = config.with_data_file(args.data);
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    let addr: SocketAddr = config.socket_addr();
    let base_path = config.api.base_path.clone();

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to initialize server state: {}", e);
            std::process::exit(1);
        }
    };
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Tessera Server listening on http://{}", addr);
    tracing::info!("JSON:API ready at http://{}{}", addr, base_path);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => tracing::error!("Failed to install signal handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
