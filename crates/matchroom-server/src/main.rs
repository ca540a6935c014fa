use std::sync::Arc;

use tracing::{info, warn};

use matchroom_db::Database;
use matchroom_gateway::GatewayState;
use matchroom_server::config::Config;
use matchroom_server::routes::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchroom=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.uses_placeholder_secret() {
        warn!("MATCHROOM_JWT_SECRET is unset or still a placeholder; tokens are forgeable");
    }

    // Init database
    let db = Database::open(&config.db_path)?;

    let state = ServerState {
        gateway: GatewayState::new(Arc::new(db), config.history_limit)
            .with_heartbeat_interval(config.heartbeat_interval),
        jwt_secret: config.jwt_secret.as_str().into(),
    };

    let app = matchroom_server::app(state);

    let addr = config.addr()?;
    info!("Matchroom gateway listening on {} (ws://{}/gateway)", addr, addr);
    info!("History window: {} messages", config.history_limit);

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
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
