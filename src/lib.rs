//! Outbreak Detector -- anomaly detection, forecasting and risk explanation
//! for daily disease case counts.
//!
//! The core is [`pipeline::Pipeline`]: it cleans a raw series, runs a z-score
//! test and an isolation-forest ensemble, forecasts the next days, and turns
//! the numbers into a rule-based risk assessment. The HTTP API and CLI are
//! thin shells around it.

pub mod analysis;
pub mod api;
pub mod config;
pub mod detect;
pub mod error;
pub mod forecast;
pub mod loader;
pub mod pipeline;
pub mod series;

use anyhow::{Context, Result};

use crate::config::AppConfig;

/// Start the HTTP API and serve until Ctrl-C.
pub async fn serve(config: AppConfig) -> Result<()> {
    let pipeline = pipeline::Pipeline::new(config.analysis.clone())
        .context("invalid analysis configuration")?;
    let loader = loader::CsvLoader::new(&config.data.data_dir);
    let app = api::router(api::state::AppState::new(pipeline, loader));

    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, data_dir = %config.data.data_dir.display(), "outbreak detector listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
