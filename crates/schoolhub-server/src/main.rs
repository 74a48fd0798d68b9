use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use schoolhub_api::auth::{AppStateInner, Backend};
use schoolhub_api::config::ServerConfig;
use schoolhub_api::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schoolhub=debug,schoolhub_api=debug,schoolhub_db=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    if !config.backend.is_configured() {
        warn!("Identity backend is unset or still a placeholder; serving public pages only.");
        warn!("Set SCHOOLHUB_BACKEND_URL, SCHOOLHUB_ANON_KEY and SCHOOLHUB_JWT_SECRET to enable sign-in.");
    }
    let backend = Backend::from_config(&config.backend)?;

    // Init database
    let db = schoolhub_db::Database::open(&config.db_path)?;

    let state = AppStateInner::new(db, backend, config.cookie_secure);

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("SchoolHub listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
