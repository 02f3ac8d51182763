//! Counter-screen endpoints: sales, adjustments, customer lookup, redemption.

use crate::rest::{api_error, loyalty_error, redemption_error, ApiError, ApiResult, AppState};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use omnily_core::loyalty::RedemptionRecord;
use omnily_loyalty::{
    AdjustmentOutcome, CustomerView, RedeemRequest, RedemptionOutcome, RedemptionStats, SaleOutcome,
    SalePreview, SaleRequest,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SaleBody {
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustBody {
    pub delta: i64,
    #[serde(default)]
    pub reason: String,
}

/// Redemption request as sent by the counter screen; the organization comes
/// from the path.
#[derive(Debug, Deserialize)]
pub struct RedeemBody {
    pub customer_id: Uuid,
    pub reward_id: Uuid,
    pub customer_points: u64,
    #[serde(default)]
    pub customer_tier: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearedResponse {
    pub cleared: usize,
}

fn sale_request(organization_id: Uuid, customer_id: Uuid, body: SaleBody) -> SaleRequest {
    SaleRequest {
        organization_id,
        customer_id,
        amount: body.amount,
        category: body.category,
    }
}

/// POST /v1/organizations/:org/customers/:customer/sales
pub async fn handle_record_sale(
    State(state): State<AppState>,
    Path((org, customer)): Path<(Uuid, Uuid)>,
    Json(body): Json<SaleBody>,
) -> ApiResult<SaleOutcome> {
    let outcome = state
        .engine
        .record_sale(&sale_request(org, customer, body))
        .await
        .map_err(loyalty_error)?;
    metrics::counter!("loyalty.api.sales").increment(1);
    Ok(Json(outcome))
}

/// POST /v1/organizations/:org/customers/:customer/sales/preview
pub async fn handle_preview_sale(
    State(state): State<AppState>,
    Path((org, customer)): Path<(Uuid, Uuid)>,
    Json(body): Json<SaleBody>,
) -> ApiResult<SalePreview> {
    state
        .engine
        .preview_sale(&sale_request(org, customer, body))
        .await
        .map(Json)
        .map_err(loyalty_error)
}

/// POST /v1/organizations/:org/customers/:customer/points/adjust
pub async fn handle_adjust_points(
    State(state): State<AppState>,
    Path((org, customer)): Path<(Uuid, Uuid)>,
    Json(body): Json<AdjustBody>,
) -> ApiResult<AdjustmentOutcome> {
    state
        .engine
        .adjust_points(org, customer, body.delta, &body.reason)
        .await
        .map(Json)
        .map_err(loyalty_error)
}

/// GET /v1/organizations/:org/customers/:customer
pub async fn handle_open_customer(
    State(state): State<AppState>,
    Path((org, customer)): Path<(Uuid, Uuid)>,
) -> ApiResult<CustomerView> {
    state
        .engine
        .open_customer(org, customer)
        .await
        .map(Json)
        .map_err(loyalty_error)
}

/// POST /v1/organizations/:org/customers/:customer/notifications/clear
pub async fn handle_clear_notifications(
    State(state): State<AppState>,
    Path((org, customer)): Path<(Uuid, Uuid)>,
) -> ApiResult<ClearedResponse> {
    let cleared = state
        .engine
        .clear_notifications(org, customer)
        .await
        .map_err(loyalty_error)?;
    Ok(Json(ClearedResponse { cleared }))
}

/// POST /v1/organizations/:org/redemptions
pub async fn handle_redeem(
    State(state): State<AppState>,
    Path(org): Path<Uuid>,
    Json(body): Json<RedeemBody>,
) -> Result<(StatusCode, Json<RedemptionOutcome>), ApiError> {
    let request = RedeemRequest {
        organization_id: org,
        customer_id: body.customer_id,
        reward_id: body.reward_id,
        customer_points: body.customer_points,
        customer_tier: body.customer_tier,
    };
    let outcome = state.engine.redeem(&request).await.map_err(redemption_error)?;
    metrics::counter!("loyalty.api.redemptions").increment(1);
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /v1/organizations/:org/customers/:customer/redemptions
pub async fn handle_customer_redemptions(
    State(state): State<AppState>,
    Path((org, customer)): Path<(Uuid, Uuid)>,
) -> ApiResult<Vec<RedemptionRecord>> {
    state
        .engine
        .redemption_history(org, customer)
        .await
        .map(Json)
        .map_err(loyalty_error)
}

/// POST /v1/organizations/:org/redemptions/:id/use (counter-side QR scan)
pub async fn handle_mark_used(
    State(state): State<AppState>,
    Path((org, redemption_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<RedemptionRecord> {
    state
        .engine
        .catalog()
        .mark_redemption_used(org, redemption_id)
        .await
        .map(Json)
        .map_err(loyalty_error)
}

/// GET /v1/organizations/:org/redemptions/stats
pub async fn handle_redemption_stats(
    State(state): State<AppState>,
    Path(org): Path<Uuid>,
) -> ApiResult<RedemptionStats> {
    state
        .engine
        .catalog()
        .redemption_stats(org, Utc::now())
        .await
        .map(Json)
        .map_err(loyalty_error)
}

/// Router fallback.
pub async fn handle_not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", "No such route")
}
