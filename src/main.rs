use anyhow::Context;
use mcphub::{
    app,
    config::HubConfig,
    services::{HealthMonitor, HttpServiceClient},
    AppState,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcphub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = HubConfig::from_env().context("Invalid hub configuration")?;
    tracing::info!(
        bind_addr = %config.bind_addr,
        heartbeat_interval_ms = config.heartbeat_interval.as_millis() as u64,
        dispatch_timeout_ms = config.dispatch_timeout.as_millis() as u64,
        dispatch_retries = config.dispatch_retries,
        routing_strategy = config.routing_strategy.as_str(),
        "Starting MCP hub"
    );

    let bind_addr = config.bind_addr;
    let health_config = config.health_config();
    let client = HttpServiceClient::try_new().context("Failed to build HTTP client")?;
    let state = AppState::with_client(config, Arc::new(client));

    // Health monitor runs until shutdown
    let shutdown = CancellationToken::new();
    let monitor = HealthMonitor::new(state.registry.clone(), health_config).spawn(shutdown.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Listening on {}", bind_addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                }
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = monitor.await {
        tracing::error!("Health monitor task failed: {}", e);
    }

    tracing::info!("MCP hub stopped");
    Ok(())
}
