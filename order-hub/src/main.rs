//! order-hub: restaurant ordering service
//!
//! - Order ledger and payment reconciliation over HTTP
//! - Provider webhooks (MyNita, Wave)
//! - Realtime kitchen / management feed over WebSocket

use order_hub::{AppState, Config, api, logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    logger::init_logger(&config.log_level, config.log_json, config.log_dir.as_deref())?;

    tracing::info!("Starting order-hub (env: {})", config.environment);

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let state = AppState::new(config).await?;
    for (name, info) in state.payments.providers_status() {
        if !info.configured {
            tracing::warn!(provider = %name, "Payment provider not configured");
        }
    }

    let app = api::build_app(state);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("order-hub HTTP listening on {http_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("order-hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
