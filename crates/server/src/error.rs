use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use llmgate_core::GatewayError;
use thiserror::Error;

/// Errors that can occur while running the llmgate server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error, raised at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A gateway-level error surfaced through the API.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The requested entity was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code, message, retry_after) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not-found", msg.clone(), None),
            Self::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration-error",
                msg.clone(),
                None,
            ),
            Self::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io-error",
                e.to_string(),
                None,
            ),
            Self::Gateway(e) => gateway_response(e),
        };

        let body = if let Some(retry) = retry_after {
            serde_json::json!({ "error": code, "message": message, "retryAfter": retry })
        } else {
            serde_json::json!({ "error": code, "message": message })
        };

        let mut response = (status, axum::Json(body)).into_response();

        if let Some(retry) = retry_after {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        response
    }
}

/// Maps a [`GatewayError`] to the HTTP status and machine-readable error
/// code from the completion API's error taxonomy.
fn gateway_response(err: &GatewayError) -> (StatusCode, &'static str, String, Option<u64>) {
    match err {
        GatewayError::InvalidRequest(_) => {
            (StatusCode::BAD_REQUEST, "invalid-request", err.to_string(), None)
        }
        GatewayError::UnknownTenant(_)
        | GatewayError::UnknownProvider(_)
        | GatewayError::UnknownCredential(_)
        | GatewayError::UnknownBot(_) => {
            (StatusCode::NOT_FOUND, "not-found", err.to_string(), None)
        }
        GatewayError::TenantSuspended(_) => (
            StatusCode::FORBIDDEN,
            "tenant-suspended",
            err.to_string(),
            None,
        ),
        GatewayError::AgentNotAllowed { .. } => (
            StatusCode::FORBIDDEN,
            "agent-not-allowed",
            err.to_string(),
            None,
        ),
        GatewayError::RateLimitExceeded { .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            "rate-limit-exceeded",
            err.to_string(),
            Some(60),
        ),
        GatewayError::BudgetExceeded(_) => (
            StatusCode::PAYMENT_REQUIRED,
            "budget-exceeded",
            err.to_string(),
            None,
        ),
        GatewayError::NoAvailableProvider(_)
        | GatewayError::CircuitOpen(_)
        | GatewayError::NoUsableCredential(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "provider-unavailable",
            err.to_string(),
            None,
        ),
        GatewayError::TransientUpstream { .. } => (
            StatusCode::BAD_GATEWAY,
            "provider-unavailable",
            err.to_string(),
            None,
        ),
        GatewayError::PermanentUpstream { .. } => (
            StatusCode::BAD_GATEWAY,
            "provider-error",
            err.to_string(),
            None,
        ),
        GatewayError::TemplateRender(_) | GatewayError::NotificationDelivery { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "notification-error",
            err.to_string(),
            None,
        ),
        GatewayError::State(_) | GatewayError::LockFailed(_) | GatewayError::Configuration(_) => {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal-error",
                err.to_string(),
                None,
            )
        }
    }
}
