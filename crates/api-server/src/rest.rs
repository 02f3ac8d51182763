//! Shared REST state, operational probes, and error mapping.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use omnily_loyalty::{LoyaltyEngine, LoyaltyError, RedemptionError, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LoyaltyEngine>,
    pub node_id: String,
    pub start_time: Instant,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

pub(crate) fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: message.into(),
        }),
    )
}

fn store_error(err: &StoreError) -> ApiError {
    error!(error = %err, "Store failure");
    metrics::counter!("api.store_errors").increment(1);
    api_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", "Loyalty store unavailable")
}

pub(crate) fn loyalty_error(err: LoyaltyError) -> ApiError {
    let status = match &err {
        LoyaltyError::NotFound { .. } => StatusCode::NOT_FOUND,
        LoyaltyError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LoyaltyError::InsufficientPoints { .. } | LoyaltyError::InvalidTransition(_) => {
            StatusCode::CONFLICT
        }
        LoyaltyError::Store(e) => return store_error(e),
    };
    metrics::counter!("api.validation_errors", "code" => err.code()).increment(1);
    api_error(status, err.code(), err.to_string())
}

pub(crate) fn redemption_error(err: RedemptionError) -> ApiError {
    let status = match &err {
        RedemptionError::NotFound { .. } => StatusCode::NOT_FOUND,
        RedemptionError::Inactive(_)
        | RedemptionError::InsufficientPoints { .. }
        | RedemptionError::OutOfStock(_)
        | RedemptionError::TierTooLow { .. }
        | RedemptionError::NotYetValid(_)
        | RedemptionError::Expired(_) => StatusCode::CONFLICT,
        RedemptionError::PartialFailure { .. } => {
            error!(error = %err, "Redemption needs manual reconciliation");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        RedemptionError::Store(e) => return store_error(e),
    };
    if err.is_validation() {
        warn!(code = err.code(), error = %err, "Redemption rejected");
    }
    api_error(status, err.code(), err.to_string())
}

/// GET /health: health check.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: readiness probe.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live: liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
