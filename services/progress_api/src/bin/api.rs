//! services/progress_api/src/bin/api.rs

use axum::http::{header::CONTENT_TYPE, Method};
use axum::Router;
use manga_progress_core::{
    LocalProgressStore, ReconcilerConfig, SessionHandle, SyncReconciler, SystemClock,
};
use progress_api_lib::{
    adapters::{DbAdapter, FileStorage, MangaDexCatalog},
    config::Config,
    error::ApiError,
    web::{self, AppState, ApiDoc},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Open the Local Ledger ---
    let storage = FileStorage::new(&config.data_dir)
        .map_err(|e| ApiError::Internal(format!("cannot open data directory: {}", e)))?;
    let store = Arc::new(LocalProgressStore::new(
        Arc::new(storage),
        Arc::new(SystemClock),
        config.history_capacity,
    ));
    info!(data_dir = %config.data_dir.display(), capacity = config.history_capacity, "Local ledger opened.");

    // --- 4. Wire the Reconciler to the Session ---
    let reconciler = SyncReconciler::new(
        store,
        db_adapter,
        ReconcilerConfig {
            remote_timeout: config.remote_timeout,
            sign_out_policy: config.sign_out_policy,
        },
    );
    let session = Arc::new(SessionHandle::new());
    let observer = reconciler.observe(session.subscribe());

    // --- 5. Initialize the Catalog Adapter ---
    let catalog = Arc::new(MangaDexCatalog::new(
        config.catalog_base_url.clone(),
        config.remote_timeout,
    )?);

    // --- 6. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        reconciler: reconciler.clone(),
        session,
        catalog,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    // --- 7. Create the Web Router ---
    let api_router = web::router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 8. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 9. Flush Pending Remote Writes ---
    info!("Shutting down; waiting for in-flight sync writes...");
    observer.abort();
    reconciler.settle().await;
    info!("Shutdown complete.");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
}
