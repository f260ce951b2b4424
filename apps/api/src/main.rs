use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, Method},
    routing::get,
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chorus_api::config::Config;
use chorus_api::repositories::{DeviceRepository, DeviceStore, UserRepository};
use chorus_api::routes::{
    devices_router, health_router, users_router, DevicesState, HealthState, UsersState,
};
use chorus_api::services::DeviceService;
use chorus_api::websocket::{ws_handler, ConnectionDirectory, PresenceTracker};

/// Build the CORS layer based on configuration.
///
/// In production mode:
/// - If `CORS_ORIGINS` is set, only those origins are allowed
/// - If `CORS_ORIGINS` is not set, CORS requests are rejected
///
/// In development mode, permissive CORS is used when no origins are
/// configured.
fn build_cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::error!("No valid CORS origins configured, CORS requests will be rejected");
                CorsLayer::new()
            } else {
                tracing::info!(
                    "CORS configured with {} allowed origin(s)",
                    allowed_origins.len()
                );
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                    .allow_headers([
                        header::AUTHORIZATION,
                        header::CONTENT_TYPE,
                        header::ACCEPT,
                        header::ORIGIN,
                    ])
                    .allow_credentials(true)
                    .max_age(std::time::Duration::from_secs(3600))
            }
        }
        _ if config.is_production() => {
            tracing::warn!(
                "CORS_ORIGINS not configured in production mode. \
                 CORS requests will be rejected. Set CORS_ORIGINS to allow cross-origin requests."
            );
            CorsLayer::new()
        }
        _ => {
            tracing::warn!(
                "Using permissive CORS in development mode. \
                 Set CORS_ORIGINS for production-like behavior."
            );
            CorsLayer::permissive()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables and configuration first so the tracing
    // filter can fall back to the configured log level
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "chorus_api={},tower_http=debug",
                    config.common.log_level
                ))
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Chorus API server on port {}", config.port);

    // Initialize database pool
    tracing::info!("Connecting to database...");
    let db = &config.common.database;
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .min_connections(db.min_connections)
        .acquire_timeout(db.acquire_timeout())
        .idle_timeout(db.idle_timeout())
        .connect(&db.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations completed successfully");

    // Durable record store for device registrations
    let device_store: Arc<dyn DeviceStore> = Arc::new(DeviceRepository::new(pool.clone()));
    let user_repo = UserRepository::new(pool.clone());

    // In-memory session state: rebuilt empty on every process start by
    // design, since live connections cannot survive a restart
    let directory = ConnectionDirectory::new();
    let presence = PresenceTracker::new();

    let device_service = DeviceService::new(device_store, directory.clone());
    tracing::info!("Session core initialized");

    let cors_layer = build_cors_layer(&config);

    // Build the router
    let app = Router::new()
        .route("/", get(root))
        // Realtime coordination socket
        .route("/ws", get(ws_handler))
        // Device routes: /devices, /devices/register, /devices/active, ...
        .nest("/devices", devices_router(DevicesState::new(device_service.clone())))
        // Per-user routes: /me/player-settings, /me/recent-songs
        .nest("/me", users_router(UsersState::new(user_repo)))
        // Nested health routes: /health, /health/live, /health/ready
        .nest("/health", health_router(HealthState::new(pool.clone())))
        // Shared state for the WebSocket handler
        .layer(Extension(directory))
        .layer(Extension(presence))
        .layer(Extension(device_service))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Chorus - multi-device session coordination"
}
