//! dynamock - in-memory DynamoDB emulator
//!
//! Serves the DynamoDB JSON protocol from a process-local store, for
//! development and tests that should not touch a real table.

mod config;
mod router;

use clap::Parser;
use dynamock_dynamodb::DynamoDBStorage;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dynamock")]
#[command(about = "In-memory DynamoDB emulator", long_about = None)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "DYNAMOCK_PORT")]
    port: Option<u16>,

    /// Host to bind to (overrides the config file)
    #[arg(long, env = "DYNAMOCK_HOST")]
    host: Option<String>,

    /// Configuration file (default: optional ./dynamock.toml)
    #[arg(short, long, env = "DYNAMOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DYNAMOCK_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "dynamock={level},dynamock_dynamodb={level},tower_http=debug",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load(args.config.as_deref())?;
    let host = args.host.unwrap_or(config.server.host);
    let port = args.port.unwrap_or(config.server.port);

    info!("Starting dynamock...");
    info!(
        region = %config.dynamodb.region,
        account = %config.dynamodb.account_id,
        "DynamoDB emulator"
    );

    let storage = Arc::new(DynamoDBStorage::with_config(config.dynamodb));
    let app = router::create_router(storage);

    // Start server
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
