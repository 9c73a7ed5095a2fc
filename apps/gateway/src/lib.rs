//! HTTP surface of the CVI gateway: signed provider webhooks, conversation
//! creation behind a per-client rate limit, and the admin event viewer.

pub mod admin;
pub mod config;
pub mod conversation;
pub mod error;
pub mod http;
pub mod rate;
pub mod reqid;
pub mod respond;
pub mod webhook;

use anyhow::Result;
use axum::serve;
use cvi_backpressure::spawn_sweeper;
use tokio::net::TcpListener;
use tracing::info;

pub use config::{GatewayConfig, VerticalConfig};
pub use error::GatewayError;
pub use http::{AppState, build_router};

/// Starts the gateway HTTP server using the provided configuration.
pub async fn run(config: GatewayConfig) -> Result<()> {
    let addr = config.addr;
    let sweep_interval = config.sweep_interval;
    let state = AppState::from_config(config)?;
    let sweeper = spawn_sweeper(state.limiter.clone(), sweep_interval);

    let router = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("cvi-gateway listening on {addr}");

    serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    sweeper.abort();
    info!("cvi-gateway stopped");
    Ok(())
}
