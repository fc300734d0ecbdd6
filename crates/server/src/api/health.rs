//! `GET /healthz` — aggregate health across the state store, the circuit
//! breaker registry, and unacknowledged critical alerts, plus the process's
//! own memory and disk headroom.
//!
//! Concrete realization of the aggregation rule: record-store reachability
//! and disk/memory headroom are treated as critical (any one unhealthy
//! makes the whole gateway unhealthy); open circuits and unacknowledged
//! critical alerts are informational (degrade, but never fail, the overall
//! status) since the gateway keeps serving other providers and tenants
//! around them.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use llmgate_store::{AlertStore, TenantStore};
use serde::Serialize;
use sysinfo::{Disks, System};

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct DependencyStatus {
    pub name: &'static str,
    pub status: Status,
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: Status,
    pub dependencies: Vec<DependencyStatus>,
    pub open_circuits: u32,
    pub unacknowledged_critical_alerts: u32,
}

/// Reads a tenant back from the store as a cheap reachability probe.
async fn check_state_store(state: &AppState) -> DependencyStatus {
    match state.tenants.list().await {
        Ok(_) => DependencyStatus {
            name: "state_store",
            status: Status::Healthy,
            detail: None,
        },
        Err(e) => DependencyStatus {
            name: "state_store",
            status: Status::Unhealthy,
            detail: Some(e.to_string()),
        },
    }
}

fn check_memory() -> DependencyStatus {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        return DependencyStatus {
            name: "memory",
            status: Status::Degraded,
            detail: Some("total memory unavailable".to_string()),
        };
    }
    let used_percent = (sys.used_memory() as f64 / total as f64) * 100.0;
    let status = if used_percent > 90.0 {
        Status::Unhealthy
    } else if used_percent > 75.0 {
        Status::Degraded
    } else {
        Status::Healthy
    };
    DependencyStatus {
        name: "memory",
        status,
        detail: Some(format!("{used_percent:.1}% used")),
    }
}

fn check_disk() -> DependencyStatus {
    let disks = Disks::new_with_refreshed_list();
    let Some(disk) = disks.iter().max_by_key(|d| d.total_space()) else {
        return DependencyStatus {
            name: "disk",
            status: Status::Degraded,
            detail: Some("no disks reported".to_string()),
        };
    };
    let total = disk.total_space();
    if total == 0 {
        return DependencyStatus {
            name: "disk",
            status: Status::Degraded,
            detail: Some("total disk space unavailable".to_string()),
        };
    }
    let free_percent = (disk.available_space() as f64 / total as f64) * 100.0;
    let status = if free_percent < 5.0 {
        Status::Unhealthy
    } else if free_percent < 15.0 {
        Status::Degraded
    } else {
        Status::Healthy
    };
    DependencyStatus {
        name: "disk",
        status,
        detail: Some(format!("{free_percent:.1}% free")),
    }
}

/// Counts unacknowledged critical alerts across every tenant. Scoped per
/// tenant the same way [`crate::repositories::BotRepositoryAdapter`] walks
/// tenants for bot lookups, since alert queries require a `tenant_id`.
async fn count_unacknowledged_critical_alerts(state: &AppState) -> anyhow::Result<u32> {
    use llmgate_core::AlertSeverity;
    use llmgate_store::Query;

    let mut count = 0u32;
    for tenant in state.tenants.list().await? {
        let page = state
            .alerts
            .query(&Query {
                tenant_id: Some(tenant.id.clone()),
                limit: Some(1000),
                ..Default::default()
            })
            .await?;
        count += page
            .records
            .iter()
            .filter(|a| !a.acknowledged && a.severity == AlertSeverity::Critical)
            .count() as u32;
    }
    Ok(count)
}

pub async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_status = check_state_store(&state).await;
    let memory_status = check_memory();
    let disk_status = check_disk();

    let provider_ids: Vec<_> = state.breakers.providers().into_iter().cloned().collect();
    let mut open_circuits_count = 0u32;
    for provider_id in &provider_ids {
        if let Some(breaker) = state.breakers.get(provider_id) {
            if breaker.state().await == llmgate_breaker::CircuitState::Open {
                open_circuits_count += 1;
            }
        }
    }

    let unacknowledged_critical_alerts = count_unacknowledged_critical_alerts(&state)
        .await
        .unwrap_or(0);

    let mut dependencies = vec![store_status, memory_status, disk_status];
    if open_circuits_count > 0 {
        dependencies.push(DependencyStatus {
            name: "circuit_breakers",
            status: Status::Degraded,
            detail: Some(format!("{open_circuits_count} open")),
        });
    }
    if unacknowledged_critical_alerts > 0 {
        dependencies.push(DependencyStatus {
            name: "alerts",
            status: Status::Degraded,
            detail: Some(format!("{unacknowledged_critical_alerts} unacknowledged critical")),
        });
    }

    let overall = dependencies
        .iter()
        .map(|d| d.status)
        .max()
        .unwrap_or(Status::Healthy);

    let response = HealthResponse {
        status: overall,
        dependencies,
        open_circuits: open_circuits_count,
        unacknowledged_critical_alerts,
    };

    let http_status = match overall {
        Status::Healthy | Status::Degraded => StatusCode::OK,
        Status::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}
