//! Loyalty engine for the point-of-sale counter: points accrual, tier
//! ladder, reward catalog, redemption, and tier-change notifications.

#![warn(clippy::unwrap_used)]

pub mod accrual;
pub mod engine;
pub mod error;
pub mod memory;
pub mod notifier;
pub mod redemption;
pub mod rewards;
pub mod sales;
pub mod store;
pub mod tiers;

pub use engine::{CustomerView, LoyaltyEngine, RedemptionOutcome};
pub use error::{LoyaltyError, LoyaltyResult};
pub use memory::InMemoryStore;
pub use redemption::{RedeemRequest, RedemptionError, RedemptionStep, RedemptionWorkflow};
pub use rewards::{RedemptionStats, RewardCatalog, RewardInput, RewardStats, RewardUpdate};
pub use sales::{AdjustmentOutcome, SaleOutcome, SalePreview, SaleRecorder, SaleRequest};
pub use store::{LoyaltyStore, StoreError, StoreOp, StoreResult};
