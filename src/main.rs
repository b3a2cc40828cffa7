use std::path::PathBuf;

use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fauna_gateway::config::ServerConfig;
use fauna_gateway::routes::create_router;
use fauna_gateway::state::AppState;

/// Fauna Gateway - conversational animal companion server
#[derive(Parser, Debug)]
#[command(name = "fauna-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML); environment variables fill the rest
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ServerConfig::from_env().context("loading config from environment")?,
    };

    let cors = cors_layer(&config)?;
    let address = config.address();
    let state = AppState::new(config);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!("listening on {address}");

    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}

fn cors_layer(config: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match config.cors_allowed_origins.as_deref() {
        None | Some("*") => Ok(layer.allow_origin(Any)),
        Some(origins) => {
            let origins = origins
                .split(',')
                .map(|origin| {
                    origin
                        .trim()
                        .parse::<HeaderValue>()
                        .with_context(|| format!("invalid CORS origin '{origin}'"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok(layer.allow_origin(AllowOrigin::list(origins)))
        }
    }
}
