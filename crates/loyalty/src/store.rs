//! Persistent store seam.
//!
//! Every method is one round-trip to the backing database. No method spans
//! more than one row, and nothing here offers multi-statement transactions:
//! workflows sequence these calls themselves.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use omnily_core::loyalty::{RedemptionRecord, RedemptionStatus, Reward, TierChangeNotification};
use omnily_core::types::{Customer, Organization};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected write: {0}")]
    Rejected(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Identifies a store operation, used for failure injection and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOp {
    GetOrganization,
    GetCustomer,
    SetCustomerPoints,
    DeductCustomerPoints,
    RecordCustomerSale,
    SetCustomerTier,
    GetReward,
    ListRewards,
    InsertReward,
    UpdateReward,
    DeleteReward,
    SetRewardStock,
    DecrementRewardStock,
    InsertRedemption,
    GetRedemption,
    ListRedemptions,
    SetRedemptionStatus,
    InsertNotification,
    LatestUnreadNotification,
    MarkNotificationsRead,
    DeleteReadNotifications,
}

/// Field set written when a sale is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerSaleUpdate {
    pub points: u64,
    pub total_spent: f64,
    pub visits: u32,
    pub last_visit: DateTime<Utc>,
}

#[async_trait]
pub trait LoyaltyStore: Send + Sync {
    // Organizations
    async fn get_organization(&self, organization_id: Uuid) -> StoreResult<Option<Organization>>;

    // Customers
    async fn get_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> StoreResult<Option<Customer>>;
    /// Unconditional overwrite of the balance.
    async fn set_customer_points(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        points: u64,
    ) -> StoreResult<Customer>;
    /// `points = points - cost WHERE points >= cost`. `None` when the balance
    /// is too low; no write happens in that case.
    async fn deduct_customer_points(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        cost: u64,
    ) -> StoreResult<Option<u64>>;
    async fn record_customer_sale(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        update: CustomerSaleUpdate,
    ) -> StoreResult<Customer>;
    async fn set_customer_tier(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        tier: &str,
    ) -> StoreResult<()>;

    // Rewards
    async fn get_reward(
        &self,
        organization_id: Uuid,
        reward_id: Uuid,
    ) -> StoreResult<Option<Reward>>;
    async fn list_rewards(&self, organization_id: Uuid) -> StoreResult<Vec<Reward>>;
    async fn insert_reward(&self, reward: Reward) -> StoreResult<Reward>;
    async fn update_reward(&self, reward: Reward) -> StoreResult<Reward>;
    async fn delete_reward(&self, organization_id: Uuid, reward_id: Uuid) -> StoreResult<bool>;
    /// Unconditional overwrite of the stock counter.
    async fn set_reward_stock(
        &self,
        organization_id: Uuid,
        reward_id: Uuid,
        stock: u32,
    ) -> StoreResult<()>;
    /// `stock = stock - 1 WHERE stock > 0`. `None` when already at zero.
    async fn decrement_reward_stock(
        &self,
        organization_id: Uuid,
        reward_id: Uuid,
    ) -> StoreResult<Option<u32>>;

    // Redemptions
    async fn insert_redemption(&self, record: RedemptionRecord) -> StoreResult<RedemptionRecord>;
    async fn get_redemption(
        &self,
        organization_id: Uuid,
        redemption_id: Uuid,
    ) -> StoreResult<Option<RedemptionRecord>>;
    /// All redemptions of the organization, optionally for one customer.
    async fn list_redemptions(
        &self,
        organization_id: Uuid,
        customer_id: Option<Uuid>,
    ) -> StoreResult<Vec<RedemptionRecord>>;
    async fn set_redemption_status(
        &self,
        organization_id: Uuid,
        redemption_id: Uuid,
        status: RedemptionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<RedemptionRecord>;

    // Tier-change notifications
    async fn insert_notification(
        &self,
        notification: TierChangeNotification,
    ) -> StoreResult<TierChangeNotification>;
    async fn latest_unread_notification(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> StoreResult<Option<TierChangeNotification>>;
    /// Marks every unread notification of the customer read. Returns how many.
    async fn mark_notifications_read(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<usize>;
    /// Deletes read notifications created before `cutoff`. Returns how many.
    async fn delete_read_notifications_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize>;
}
