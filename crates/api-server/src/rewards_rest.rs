//! Reward catalog management endpoints.

use crate::rest::{loyalty_error, ApiError, ApiResult, AppState};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use omnily_core::loyalty::Reward;
use omnily_loyalty::{RewardInput, RewardStats, RewardUpdate};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AvailableQuery {
    pub points: u64,
    #[serde(default)]
    pub tier: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleBody {
    pub is_active: bool,
}

/// GET /v1/organizations/:org/rewards
pub async fn handle_list_rewards(
    State(state): State<AppState>,
    Path(org): Path<Uuid>,
) -> ApiResult<Vec<Reward>> {
    state
        .engine
        .catalog()
        .list_all(org)
        .await
        .map(Json)
        .map_err(loyalty_error)
}

/// POST /v1/organizations/:org/rewards
pub async fn handle_create_reward(
    State(state): State<AppState>,
    Path(org): Path<Uuid>,
    Json(input): Json<RewardInput>,
) -> Result<(StatusCode, Json<Reward>), ApiError> {
    let reward = state
        .engine
        .catalog()
        .create(org, input)
        .await
        .map_err(loyalty_error)?;
    Ok((StatusCode::CREATED, Json(reward)))
}

/// GET /v1/organizations/:org/rewards/active
pub async fn handle_active_rewards(
    State(state): State<AppState>,
    Path(org): Path<Uuid>,
) -> ApiResult<Vec<Reward>> {
    state
        .engine
        .catalog()
        .list_active(org)
        .await
        .map(Json)
        .map_err(loyalty_error)
}

/// GET /v1/organizations/:org/rewards/available?points=&tier=
pub async fn handle_available_rewards(
    State(state): State<AppState>,
    Path(org): Path<Uuid>,
    Query(query): Query<AvailableQuery>,
) -> ApiResult<Vec<Reward>> {
    state
        .engine
        .catalog()
        .available_for_customer(org, query.points, query.tier.as_deref(), Utc::now())
        .await
        .map(Json)
        .map_err(loyalty_error)
}

/// GET /v1/organizations/:org/rewards/stats
pub async fn handle_reward_stats(
    State(state): State<AppState>,
    Path(org): Path<Uuid>,
) -> ApiResult<RewardStats> {
    state
        .engine
        .catalog()
        .stats(org, Utc::now())
        .await
        .map(Json)
        .map_err(loyalty_error)
}

/// PUT /v1/organizations/:org/rewards/:id
pub async fn handle_update_reward(
    State(state): State<AppState>,
    Path((org, id)): Path<(Uuid, Uuid)>,
    Json(update): Json<RewardUpdate>,
) -> ApiResult<Reward> {
    state
        .engine
        .catalog()
        .update(org, id, update)
        .await
        .map(Json)
        .map_err(loyalty_error)
}

/// DELETE /v1/organizations/:org/rewards/:id
pub async fn handle_delete_reward(
    State(state): State<AppState>,
    Path((org, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .catalog()
        .delete(org, id)
        .await
        .map_err(loyalty_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/organizations/:org/rewards/:id/toggle
pub async fn handle_toggle_reward(
    State(state): State<AppState>,
    Path((org, id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ToggleBody>,
) -> ApiResult<Reward> {
    state
        .engine
        .catalog()
        .toggle(org, id, body.is_active)
        .await
        .map(Json)
        .map_err(loyalty_error)
}
