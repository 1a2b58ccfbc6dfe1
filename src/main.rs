use std::sync::Arc;
use std::time::Duration;

use registrar_api::config;
use registrar_api::database::DatabaseManager;
use registrar_api::storage::LocalDocumentStorage;
use registrar_api::{app, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SECURITY_JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    let config = config::config().clone();
    let default_filter = if config.api.enable_request_logging {
        "info,tower_http=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();
    tracing::info!("Starting registrar API in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("SECURITY_JWT_SECRET must be set outside development");
    }

    let pool = DatabaseManager::main_pool().await?;
    DatabaseManager::migrate(&pool).await?;

    let storage = Arc::new(LocalDocumentStorage::new(config.workflow.upload_dir.clone()));
    let port = config.api.port;
    let purge_every = Duration::from_secs(config.workflow.cache_ttl_secs.max(1));
    let state = AppState::new(pool, config, storage);

    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_every);
        loop {
            ticker.tick().await;
            let purged = sweeper.purge_caches().await;
            if purged > 0 {
                tracing::debug!("purged {} expired cache entries", purged);
            }
        }
    });

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Registrar API listening on http://{}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    DatabaseManager::close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("shutting down");
}
