use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulse_graph::{
    api::{create_router, AppState},
    config::Config,
    db,
    error::AppError,
    graphql::{build_schema, MAX_QUERY_DEPTH},
    media::LocalMediaStore,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pulse_graph=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting Pulse Graph server v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    tracing::info!("✅ Configuration loaded");

    // Connect and migrate; the server does not start without a store
    let pool = db::connect(&config).await.map_err(|e| {
        tracing::error!("❌ Database unavailable: {}", e);
        e
    })?;
    tracing::info!("✅ Database connected: {}", config.database_url);
    tracing::info!("✅ Database migrations completed");

    // Media storage
    let media_dir = PathBuf::from(&config.media_dir);
    tokio::fs::create_dir_all(&media_dir).await?;
    let media = Arc::new(LocalMediaStore::new(media_dir.clone(), &config.public_base_url));
    tracing::info!("✅ Media store ready at {}", media_dir.display());

    // Create shared application state and schema
    let state = AppState::new(pool, media, config.clone());
    let schema = build_schema(state.clone());
    tracing::info!("✅ GraphQL schema built (max depth {})", MAX_QUERY_DEPTH);

    // Build router
    let app = create_router(state, schema, &media_dir);

    // Bind and serve
    let addr = config.server_address();
    tracing::info!("🌐 Server listening on http://{}", addr);
    tracing::info!("🏥 Health check: http://{}/api/health", addr);
    tracing::info!("🔎 GraphiQL: http://{}/graphql", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
