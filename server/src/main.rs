mod api;
mod db;
mod error;
mod services;
mod types;

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use api::subnets::AppState;
use services::GatewayConvention;

#[derive(Parser, Debug)]
#[command(name = "ipamd-server")]
#[command(about = "IPv4 subnet and address pool service", long_about = None)]
struct Args {
    /// Bind address for HTTP server
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Database file path
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Gateway convention for subnets without an explicit override
    #[arg(long, default_value = "first-usable")]
    gateway: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let gateway = match args.gateway.to_lowercase().as_str() {
        "first-usable" => GatewayConvention::FirstUsable,
        "last-usable" => GatewayConvention::LastUsable,
        other => anyhow::bail!("Unknown gateway convention: {}", other),
    };

    info!("Starting IPAM service");

    // Initialize database
    let db = db::init_db(args.db_path)?;

    // Create application state
    let state = Arc::new(AppState { db, gateway });

    // Create router
    let app = api::create_router(state);

    // Parse bind address
    let addr: SocketAddr = args.bind.parse()?;
    info!("Listening on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
