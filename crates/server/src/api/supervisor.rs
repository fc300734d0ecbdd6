//! Supervisor admin endpoints: last tick report, manual trigger.

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::error::ServerError;
use crate::state::{dispatch_supervisor_alert, summarize_tick, AppState, SupervisorTickReport};

pub async fn last_tick(State(state): State<AppState>) -> Json<Option<SupervisorTickReport>> {
    Json(state.last_tick.read().await.clone())
}

/// Runs one supervisor cycle immediately instead of waiting for the next
/// cron occurrence. Mirrors what `llmgate-cli`'s `tick` subcommand does
/// against the same in-memory backend.
pub async fn trigger(State(state): State<AppState>) -> Result<Json<SupervisorTickReport>, ServerError> {
    let started = Utc::now();
    let results = state
        .supervisor
        .tick(started)
        .await?
        .ok_or_else(|| ServerError::Config("another replica holds the supervisor claim".to_string()))?;

    let report = summarize_tick(started, &results);
    for (_, alerts) in &results {
        for alert in alerts {
            dispatch_supervisor_alert(&state, alert).await;
        }
    }
    *state.last_tick.write().await = Some(report.clone());
    Ok(Json(report))
}
