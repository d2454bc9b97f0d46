use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;

use giacomino_backend::core::config::Settings;
use giacomino_backend::core::logging;
use giacomino_backend::server;
use giacomino_backend::state::AppState;

const BUCKET_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("Invalid configuration")?;
    let log_stats = logging::init(&settings).context("Invalid log configuration")?;
    tracing::info!("Starting with {:?}", settings);

    let bind_addr = settings.bind_addr();
    let state = AppState::initialize(settings, log_stats)
        .await
        .context("Failed to initialize application state")?;

    state.chat.limiter().spawn_purge_task(BUCKET_PURGE_INTERVAL);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app = server::router::router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
