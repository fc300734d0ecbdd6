//! HTTP routing. Grounded on the teacher's `api/mod.rs` layout (public vs.
//! protected sub-routers merged into one, request tracing and permissive
//! CORS applied last) but narrower: no session auth layer and no embedded
//! Admin UI, since neither exists here.

pub mod admin_agents;
pub mod alerts;
pub mod analytics;
pub mod breakers;
pub mod complete;
pub mod credentials;
pub mod health;
pub mod providers;
pub mod supervisor;
pub mod tenants;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

#[must_use]
pub fn router(state: AppState) -> Router {
    let public = Router::new().route("/healthz", get(health::healthz));

    let admin = Router::new()
        .route("/v1/complete", post(complete::complete))
        .route("/admin/tenants", get(tenants::list).post(tenants::create))
        .route("/admin/tenants/:id", get(tenants::get))
        .route("/admin/tenants/:id/suspend", post(tenants::suspend))
        .route("/admin/tenants/:id/resume", post(tenants::resume))
        .route("/admin/providers", get(providers::list).post(providers::create))
        .route(
            "/admin/credentials/:provider_id",
            get(credentials::list_for_provider).post(credentials::create),
        )
        .route("/admin/credentials/:provider_id/refresh", post(credentials::refresh))
        .route("/admin/bots", get(admin_agents::list_bots))
        .route("/admin/agents", get(admin_agents::list_agents))
        .route("/admin/alerts", get(alerts::list))
        .route("/admin/alerts/:id/acknowledge", post(alerts::acknowledge))
        .route("/admin/analytics/usage", get(analytics::usage))
        .route("/admin/breakers", get(breakers::list))
        .route("/admin/breakers/:provider_id/trip", post(breakers::trip))
        .route("/admin/breakers/:provider_id/reset", post(breakers::reset))
        .route("/admin/supervisor/last-tick", get(supervisor::last_tick))
        .route("/admin/supervisor/trigger", put(supervisor::trigger));

    public
        .merge(admin)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
