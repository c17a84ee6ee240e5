use anyhow::Context;
use std::net::SocketAddr;

use crate::cli::utils::build_state;
use crate::config;
use crate::database::DatabaseManager;
use crate::services::AuthService;

pub async fn handle(migrate: bool) -> anyhow::Result<()> {
    let config = config::config();
    tracing::info!("Starting {} in {:?} mode", config.app.name, config.environment);

    let state = build_state(config)?;
    if migrate {
        DatabaseManager::migrate(&state.pool)
            .await
            .context("applying migrations")?;
    }

    // Expired blacklist rows are useless once the tokens themselves expire
    let auth = AuthService::new(state.pool.clone());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match auth.purge_blacklist().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "expired blacklist entries removed"),
                Err(e) => tracing::warn!("blacklist purge failed: {}", e),
            }
        }
    });

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("{} listening on http://{}", config.app.name, bind_addr);

    axum::serve(
        listener,
        crate::app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
}
