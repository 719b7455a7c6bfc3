//! Quarry Server Binary
//!
//! Serves the Quarry analytics dashboard over HTTP against the configured
//! PostgreSQL database.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use clap::Parser;
use quarry_common::config::QuarryConfig;
use quarry_db::PostgresBackend;
use quarry_server::{create_router, AppState, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser)]
#[command(name = "quarry-server")]
#[command(about = "Quarry PostgreSQL Analytics Dashboard")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8501")]
    port: u16,

    /// TOML secrets file with [database], [auth] and [dashboard] sections
    #[arg(short, long, env = "QUARRY_SECRETS_FILE")]
    secrets: Option<PathBuf>,

    /// Disable permissive CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Rate limit logins by X-Forwarded-For / X-Real-IP (only behind a reverse proxy)
    #[arg(long, env = "QUARRY_TRUST_PROXY_HEADERS")]
    trust_proxy_headers: bool,
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

    let quarry = match QuarryConfig::load(args.secrets.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = quarry.database.validate() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    let config = ServerConfig::new(&args.host, args.port)
        .with_cors(!args.no_cors)
        .with_trust_proxy_headers(args.trust_proxy_headers);
    let addr: SocketAddr = config.socket_addr();

    tracing::info!(
        "Database {}@{}:{}/{} (schema {})",
        quarry.database.user,
        quarry.database.host,
        quarry.database.port,
        quarry.database.name,
        quarry.database.schema
    );
    if quarry.dashboard.read_only {
        tracing::info!("Read-only mode: custom SQL is limited to SELECT statements");
    }

    let backend = Arc::new(PostgresBackend::new(&quarry.database));
    let state = AppState::new(config, &quarry, backend);
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Quarry dashboard listening on http://{}", addr);

    // Run server with graceful shutdown
    if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
