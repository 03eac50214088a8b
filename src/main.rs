use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use clap::Parser;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clinic_records_api::config::AppConfig;
use clinic_records_api::database::{MemoryStore, Persistence, PgStore};
use clinic_records_api::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "clinic-records-api", version, about = "Clinic records API server")]
struct Args {
    /// Port to listen on (overrides PORT)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Interface to bind (overrides HOST)
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Keep all data in process memory instead of PostgreSQL
    #[arg(long, env = "IN_MEMORY")]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    info!("Starting clinic records API in {:?} mode", config.environment);

    let store: Arc<dyn Persistence> = match (&config.database.url, args.in_memory) {
        (Some(_), false) => Arc::new(
            PgStore::connect(&config.database)
                .await
                .context("failed to connect to PostgreSQL")?,
        ),
        (None, false) => {
            warn!("DATABASE_URL is not set; using the in-memory store");
            Arc::new(MemoryStore::new())
        }
        (_, true) => {
            info!("Using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let cors = cors_layer(&config.server.cors_origins);
    let admin = config.security.admin.clone();
    let state = AppState::new(config, store);

    if let Some(admin) = admin {
        clinic_records_api::bootstrap_admin(&state, &admin)
            .await
            .context("failed to seed admin user")?;
    }

    let app = clinic_records_api::app(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    base.allow_origin(origins)
}
