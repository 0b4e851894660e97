//! Canopy Server - keeps a cannabis facility's records in step with the
//! state compliance registry.
//!
//! Exposes HTTP endpoints to pull registry records into the local store,
//! push unregistered local records out, link records by hand and report
//! push readiness.

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod registry;
mod routes;
mod sync;

use crate::config::Config;
use crate::db::PgStore;
use crate::registry::HttpRegistryConnector;
use crate::sync::{SyncOptions, SyncService};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SyncService>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Canopy Server on {}:{}", config.host, config.port);

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    let connector = HttpRegistryConnector::new(&config.registry)?;
    let service = SyncService::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(connector),
        SyncOptions::from_config(&config),
    );
    tracing::info!(
        registry = %config.registry.base_url,
        push_concurrency = config.push_concurrency,
        "Sync service ready"
    );

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        service: Arc::new(service),
        config: Arc::new(config),
    };

    let app = app(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "canopy_server=debug,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// The full router: every route behind request tracing and a permissive CORS
/// policy.
fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::create_routes()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
