//! The llmgate HTTP server: wires every service crate into one [`state::AppState`]
//! and exposes it over the completion and admin HTTP APIs.

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod repositories;
pub mod state;

use tracing::info;

use crate::config::GatewayConfig;

/// Builds the application state, spawns the background supervisor
/// scheduler, and serves the HTTP API until the process is terminated.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let app_state = state::build(&config).await?;

    let scheduler_state = app_state.clone();
    tokio::spawn(state::run_supervisor_scheduler(scheduler_state));

    let router = api::router(app_state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
