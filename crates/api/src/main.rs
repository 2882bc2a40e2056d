//! MediRouter API server binary.
//!
//! Usage:
//!   medirouter-api --config medirouter.toml
//!   medirouter-api --port 8080 --bind 0.0.0.0
//!
//! # Environment Variables
//!
//! - `MEDIROUTER_BIND_ADDR` - Server bind address (default: 127.0.0.1)
//! - `MEDIROUTER_CORS_ORIGINS` - CORS allowed origins (comma-separated)
//! - `GEMINI_API_KEY` / `OPENAI_API_KEY` - Classifier credentials

use clap::Parser;
use medirouter_api::{serve, AppState};
use medirouter_coordinator::CoordinatorConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "medirouter-api", version, about = "MediRouter routing coordinator API server")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Bind address
    #[arg(short, long, env = "MEDIROUTER_BIND_ADDR", default_value = "127.0.0.1")]
    bind: String,

    /// CORS allowed origins
    #[arg(long, env = "MEDIROUTER_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,medirouter_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.bind == "0.0.0.0" {
        tracing::warn!(
            "Server binding to 0.0.0.0. The API has no authentication; put it behind a gateway."
        );
    }

    let config = match &args.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            CoordinatorConfig::from_file(path)?
        }
        None => {
            tracing::info!("Using default configuration");
            CoordinatorConfig::default()
        }
    };

    let state = AppState::new(config)?;

    let cors_origins = args.cors_origins.map(|origins| {
        origins
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    });

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    serve(Arc::new(state), addr, cors_origins).await?;

    Ok(())
}
