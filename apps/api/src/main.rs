mod config;
mod errors;
mod models;
mod profile;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, StoreBackend};
use crate::profile::events::{EventBus, Fanout, NotificationSink, TracingSink};
use crate::profile::service::ProfileService;
use crate::profile::store::{MemoryProfileStore, PgProfileStore, ProfileStore};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Craftly API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the document store
    let store: Arc<dyn ProfileStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres store")?;
            Arc::new(PgProfileStore::connect(url).await?)
        }
        StoreBackend::Memory => {
            info!("Using in-memory profile store; documents are lost on restart");
            Arc::new(MemoryProfileStore::new())
        }
    };

    // Save notifications go to SSE subscribers and the log
    let events = EventBus::new(config.event_channel_capacity);
    let sink: Arc<dyn NotificationSink> =
        Arc::new(Fanout(vec![Arc::new(events.clone()), Arc::new(TracingSink)]));

    let settings = config.session_settings();
    info!(
        "Auto-save after {:?}, inline save after {:?}",
        settings.autosave_delay, settings.inline_save_delay
    );
    let profiles = Arc::new(ProfileService::new(store, sink, settings));

    // Build app state
    let state = AppState {
        profiles,
        events,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
