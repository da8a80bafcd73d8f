use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

use service_core::observability::logging::init_tracing;
use user_service::{
    build_router,
    config::AppConfig,
    db,
    middleware::PolicyTable,
    services::{AuthService, JwtService, LocalStorage, PgUserStore, UserService},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = AppConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting user service"
    );

    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::Error::new(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::Error::new(e)))?;
    tracing::info!("Database initialized successfully");

    let store = Arc::new(PgUserStore::new(pool));
    let storage = Arc::new(LocalStorage::new(&config.storage.upload_dir).await?);
    let jwt = JwtService::new(&config.jwt)?;
    tracing::info!("JWT service initialized");

    let auth_service = AuthService::new(
        store.clone(),
        jwt.clone(),
        config.security.public_secret.clone(),
    );
    let user_service = UserService::new(store.clone(), storage.clone());

    let state = AppState {
        config: config.clone(),
        store,
        storage,
        jwt,
        auth_service,
        user_service,
        policies: PolicyTable::routes(),
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
