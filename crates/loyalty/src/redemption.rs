//! Reward redemption: validate, deduct points, decrement stock, record.
//!
//! Validation runs to completion before the first write. The writes that
//! follow are separate store round-trips with no rollback: if one fails after
//! an earlier one succeeded, the caller gets `PartialFailure` and must
//! reconcile by hand.
//!
//! The customer's balance and tier come from the caller (what the counter
//! screen is showing) rather than being re-read here. Redeeming twice with
//! the same arguments deducts twice.

use crate::store::{LoyaltyStore, StoreError};
use crate::tiers::{find_tier, resolve_tier};
use chrono::{DateTime, Utc};
use omnily_core::loyalty::{RedemptionRecord, RedemptionStatus, Reward};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub reward_id: Uuid,
    /// Balance as displayed to staff.
    pub customer_points: u64,
    /// Tier name as displayed to staff.
    #[serde(default)]
    pub customer_tier: Option<String>,
}

/// The write that failed after points were already deducted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStep {
    StockUpdate,
    RecordInsert,
}

impl std::fmt::Display for RedemptionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedemptionStep::StockUpdate => f.write_str("stock update"),
            RedemptionStep::RecordInsert => f.write_str("redemption record insert"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RedemptionError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("reward {0} is not active")]
    Inactive(Uuid),

    #[error("insufficient points: need {required}, have {available}")]
    InsufficientPoints { required: u64, available: u64 },

    #[error("reward {0} is out of stock")]
    OutOfStock(Uuid),

    #[error("tier too low: requires {required}, customer is {actual}")]
    TierTooLow { required: String, actual: String },

    #[error("reward not valid until {0}")]
    NotYetValid(DateTime<Utc>),

    #[error("reward expired at {0}")]
    Expired(DateTime<Utc>),

    /// Points were deducted but a later write failed. Needs manual reconciliation.
    #[error(
        "redemption partially applied: {step} failed after points were deducted \
         (stock decremented: {stock_decremented}): {source}"
    )]
    PartialFailure {
        step: RedemptionStep,
        points_deducted: u64,
        stock_decremented: bool,
        source: StoreError,
    },

    /// The store failed before anything was written.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl RedemptionError {
    /// Stable machine code for APIs and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            RedemptionError::NotFound { .. } => "not_found",
            RedemptionError::Inactive(_) => "inactive",
            RedemptionError::InsufficientPoints { .. } => "insufficient_points",
            RedemptionError::OutOfStock(_) => "out_of_stock",
            RedemptionError::TierTooLow { .. } => "tier_too_low",
            RedemptionError::NotYetValid(_) => "not_yet_valid",
            RedemptionError::Expired(_) => "expired",
            RedemptionError::PartialFailure { .. } => "redemption_partial_failure",
            RedemptionError::Store(_) => "store_error",
        }
    }

    /// True for the checks that run before any write.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            RedemptionError::PartialFailure { .. } | RedemptionError::Store(_)
        )
    }
}

impl From<StoreError> for RedemptionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => RedemptionError::NotFound { entity, id },
            other => RedemptionError::Store(other),
        }
    }
}

pub struct RedemptionWorkflow {
    store: Arc<dyn LoyaltyStore>,
    atomic: bool,
}

impl RedemptionWorkflow {
    /// `atomic` switches points and stock writes to the store's conditional
    /// operations, so concurrent redemptions cannot overdraw.
    pub fn new(store: Arc<dyn LoyaltyStore>, atomic: bool) -> Self {
        Self { store, atomic }
    }

    pub async fn redeem(
        &self,
        request: &RedeemRequest,
    ) -> Result<RedemptionRecord, RedemptionError> {
        self.redeem_at(request, Utc::now()).await
    }

    pub async fn redeem_at(
        &self,
        request: &RedeemRequest,
        now: DateTime<Utc>,
    ) -> Result<RedemptionRecord, RedemptionError> {
        let result = self.run(request, now).await;
        if let Err(e) = &result {
            metrics::counter!("loyalty.redemption_rejected", "reason" => e.code()).increment(1);
        }
        result
    }

    async fn run(
        &self,
        request: &RedeemRequest,
        now: DateTime<Utc>,
    ) -> Result<RedemptionRecord, RedemptionError> {
        let reward = self
            .store
            .get_reward(request.organization_id, request.reward_id)
            .await?
            .ok_or(RedemptionError::NotFound {
                entity: "reward",
                id: request.reward_id,
            })?;

        self.validate(request, &reward, now).await?;

        let cost = reward.points_required;
        let (points_before, points_after) = self.deduct_points(request, cost).await?;

        let mut stock_decremented = false;
        if reward.tracks_stock() {
            self.decrement_stock(request, &reward).await.map_err(|source| {
                self.partial(request, RedemptionStep::StockUpdate, cost, false, source)
            })?;
            stock_decremented = true;
        }

        let record = RedemptionRecord {
            id: Uuid::new_v4(),
            organization_id: request.organization_id,
            customer_id: request.customer_id,
            reward_id: reward.id,
            reward_name: reward.name.clone(),
            reward_type: reward.kind.type_name().to_string(),
            reward_value: reward.kind.value_label(),
            points_spent: cost,
            customer_points_before: points_before,
            customer_points_after: points_after,
            customer_tier: request.customer_tier.clone(),
            status: RedemptionStatus::Redeemed,
            redeemed_at: now,
            used_at: None,
        };

        let record = self
            .store
            .insert_redemption(record)
            .await
            .map_err(|source| {
                self.partial(request, RedemptionStep::RecordInsert, cost, stock_decremented, source)
            })?;

        metrics::counter!("loyalty.redemptions").increment(1);
        metrics::counter!("loyalty.points_redeemed").increment(cost);
        info!(
            customer_id = %request.customer_id,
            reward = %reward.name,
            cost = cost,
            new_balance = points_after,
            "Reward redeemed"
        );

        Ok(record)
    }

    /// Pre-write checks, first failure wins.
    async fn validate(
        &self,
        request: &RedeemRequest,
        reward: &Reward,
        now: DateTime<Utc>,
    ) -> Result<(), RedemptionError> {
        if !reward.is_active {
            return Err(RedemptionError::Inactive(reward.id));
        }

        if request.customer_points < reward.points_required {
            return Err(RedemptionError::InsufficientPoints {
                required: reward.points_required,
                available: request.customer_points,
            });
        }

        if !reward.in_stock() {
            return Err(RedemptionError::OutOfStock(reward.id));
        }

        if let Some(required) = &reward.required_tier {
            self.check_tier(request, required).await?;
        }

        if let Some(from) = reward.valid_from {
            if now < from {
                return Err(RedemptionError::NotYetValid(from));
            }
        }
        if let Some(until) = reward.valid_until {
            if now > until {
                return Err(RedemptionError::Expired(until));
            }
        }

        debug!(
            reward_id = %reward.id,
            customer_id = %request.customer_id,
            "Redemption checks passed"
        );
        Ok(())
    }

    async fn check_tier(
        &self,
        request: &RedeemRequest,
        required: &str,
    ) -> Result<(), RedemptionError> {
        let organization = self
            .store
            .get_organization(request.organization_id)
            .await?
            .ok_or(RedemptionError::NotFound {
                entity: "organization",
                id: request.organization_id,
            })?;
        let ladder = organization.effective_ladder();

        let customer_tier = request
            .customer_tier
            .as_deref()
            .and_then(|name| find_tier(name, &ladder))
            .unwrap_or_else(|| resolve_tier(request.customer_points, &ladder));

        let required_tier =
            find_tier(required, &ladder).ok_or_else(|| RedemptionError::TierTooLow {
                required: required.to_string(),
                actual: customer_tier.name.clone(),
            })?;

        if customer_tier.threshold < required_tier.threshold {
            return Err(RedemptionError::TierTooLow {
                required: required_tier.name,
                actual: customer_tier.name,
            });
        }
        Ok(())
    }

    /// First write of the sequence. A failure here leaves nothing applied.
    /// Returns the balance before and after the deduction.
    async fn deduct_points(
        &self,
        request: &RedeemRequest,
        cost: u64,
    ) -> Result<(u64, u64), RedemptionError> {
        if self.atomic {
            let deducted = self
                .store
                .deduct_customer_points(request.organization_id, request.customer_id, cost)
                .await?;
            return match deducted {
                Some(after) => Ok((after + cost, after)),
                None => Err(RedemptionError::InsufficientPoints {
                    required: cost,
                    available: self.stored_balance(request).await?,
                }),
            };
        }

        let new_points = request.customer_points - cost;
        self.store
            .set_customer_points(request.organization_id, request.customer_id, new_points)
            .await?;
        Ok((request.customer_points, new_points))
    }

    /// Balance the store holds, for reporting a rejected conditional deduct.
    async fn stored_balance(&self, request: &RedeemRequest) -> Result<u64, RedemptionError> {
        self.store
            .get_customer(request.organization_id, request.customer_id)
            .await?
            .map(|c| c.points)
            .ok_or(RedemptionError::NotFound {
                entity: "customer",
                id: request.customer_id,
            })
    }

    async fn decrement_stock(
        &self,
        request: &RedeemRequest,
        reward: &Reward,
    ) -> Result<(), StoreError> {
        if self.atomic {
            return match self
                .store
                .decrement_reward_stock(request.organization_id, reward.id)
                .await?
            {
                Some(_) => Ok(()),
                None => Err(StoreError::Rejected(format!(
                    "reward {} ran out of stock",
                    reward.id
                ))),
            };
        }

        let remaining = reward.stock_quantity.unwrap_or(0).saturating_sub(1);
        self.store
            .set_reward_stock(request.organization_id, reward.id, remaining)
            .await
    }

    fn partial(
        &self,
        request: &RedeemRequest,
        step: RedemptionStep,
        points_deducted: u64,
        stock_decremented: bool,
        source: StoreError,
    ) -> RedemptionError {
        metrics::counter!("loyalty.redemption_partial_failure").increment(1);
        error!(
            customer_id = %request.customer_id,
            reward_id = %request.reward_id,
            step = %step,
            points_deducted = points_deducted,
            error = %source,
            "Redemption partially applied, manual reconciliation required"
        );
        RedemptionError::PartialFailure {
            step,
            points_deducted,
            stock_decremented,
            source,
        }
    }
}
