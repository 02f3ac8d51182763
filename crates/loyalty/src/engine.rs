//! Loyalty engine: the single entry point the POS front end talks to.
//!
//! Wires the store, the mailer, and the event sink into the sale recorder,
//! the redemption workflow, the tier-change notifier, and the catalog.

use crate::error::{LoyaltyError, LoyaltyResult};
use crate::notifier::{TierChangeContext, TierChangeNotifier, TierChangeOutcome};
use crate::redemption::{RedeemRequest, RedemptionError, RedemptionWorkflow};
use crate::rewards::RewardCatalog;
use crate::sales::{AdjustmentOutcome, SaleOutcome, SalePreview, SaleRecorder, SaleRequest};
use crate::store::LoyaltyStore;
use crate::tiers::{next_tier, resolve_tier, tier_progress};
use chrono::{DateTime, Utc};
use omnily_core::channels::EmailDispatcher;
use omnily_core::config::LoyaltyConfig;
use omnily_core::event_bus::{EventSink, LoyaltyEvent};
use omnily_core::loyalty::{RedemptionRecord, TierChangeNotification, TierDefinition};
use omnily_core::types::Customer;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct RedemptionOutcome {
    pub record: RedemptionRecord,
    /// `None` when the post-redemption tier check could not run.
    pub tier_change: Option<TierChangeOutcome>,
}

/// Everything the counter screen shows when a customer is selected.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerView {
    pub customer: Customer,
    pub tier: TierDefinition,
    pub next_tier: Option<TierDefinition>,
    pub tier_progress: f64,
    pub pending_notification: Option<TierChangeNotification>,
}

pub struct LoyaltyEngine {
    store: Arc<dyn LoyaltyStore>,
    events: Arc<dyn EventSink>,
    config: LoyaltyConfig,
    workflow: RedemptionWorkflow,
    notifier: Arc<TierChangeNotifier>,
    sales: SaleRecorder,
    catalog: RewardCatalog,
}

impl LoyaltyEngine {
    pub fn new(
        store: Arc<dyn LoyaltyStore>,
        mailer: Arc<dyn EmailDispatcher>,
        events: Arc<dyn EventSink>,
        config: &LoyaltyConfig,
    ) -> Self {
        info!(
            atomic_redemption = config.atomic_redemption,
            retention_days = config.notification_retention_days,
            "Loyalty engine initialized"
        );
        let notifier = Arc::new(TierChangeNotifier::new(
            store.clone(),
            mailer,
            events.clone(),
            config.notification_retention_days,
        ));
        Self {
            workflow: RedemptionWorkflow::new(store.clone(), config.atomic_redemption),
            sales: SaleRecorder::new(
                store.clone(),
                notifier.clone(),
                events.clone(),
                config.default_points_per_unit,
            ),
            catalog: RewardCatalog::new(store.clone()),
            notifier,
            store,
            events,
            config: config.clone(),
        }
    }

    pub fn catalog(&self) -> &RewardCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &LoyaltyConfig {
        &self.config
    }

    // ─── Sales ─────────────────────────────────────────────────────────────

    pub async fn preview_sale(&self, request: &SaleRequest) -> LoyaltyResult<SalePreview> {
        self.sales.preview_sale(request).await
    }

    pub async fn record_sale(&self, request: &SaleRequest) -> LoyaltyResult<SaleOutcome> {
        self.sales.record_sale(request).await
    }

    pub async fn adjust_points(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        delta: i64,
        reason: &str,
    ) -> LoyaltyResult<AdjustmentOutcome> {
        self.sales
            .adjust_points(organization_id, customer_id, delta, reason)
            .await
    }

    // ─── Redemption ────────────────────────────────────────────────────────

    /// Runs the redemption, then re-evaluates the tier on the lowered balance.
    ///
    /// A redemption can move a customer down the ladder. A failed tier check
    /// does not undo a committed redemption; it is logged and reported as
    /// `tier_change: None`, and the next balance change repairs the tier.
    pub async fn redeem(
        &self,
        request: &RedeemRequest,
    ) -> Result<RedemptionOutcome, RedemptionError> {
        let record = match self.workflow.redeem(request).await {
            Ok(record) => record,
            Err(err) => {
                if let RedemptionError::PartialFailure { step, .. } = &err {
                    self.events.publish(LoyaltyEvent::RedemptionPartialFailure {
                        organization_id: request.organization_id,
                        customer_id: request.customer_id,
                        reward_id: request.reward_id,
                        step: step.to_string(),
                        at: Utc::now(),
                    });
                }
                return Err(err);
            }
        };

        self.events.publish(LoyaltyEvent::PointsRedeemed {
            organization_id: record.organization_id,
            customer_id: record.customer_id,
            redemption_id: record.id,
            points_spent: record.points_spent,
            new_balance: record.customer_points_after,
            at: record.redeemed_at,
        });

        let tier_change = match self.tier_check_after(&record).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(redemption_id = %record.id, error = %e, "Tier check after redemption failed");
                None
            }
        };

        Ok(RedemptionOutcome { record, tier_change })
    }

    async fn tier_check_after(
        &self,
        record: &RedemptionRecord,
    ) -> LoyaltyResult<TierChangeOutcome> {
        let organization = self
            .store
            .get_organization(record.organization_id)
            .await?
            .ok_or(LoyaltyError::NotFound {
                entity: "organization",
                id: record.organization_id,
            })?;
        let customer = self
            .store
            .get_customer(record.organization_id, record.customer_id)
            .await?
            .ok_or(LoyaltyError::NotFound {
                entity: "customer",
                id: record.customer_id,
            })?;
        let ctx = TierChangeContext::new(
            &organization,
            &customer,
            record.customer_points_before,
            record.customer_points_after,
        );
        Ok(self.notifier.handle_tier_change(&ctx).await?)
    }

    pub async fn redemption_history(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> LoyaltyResult<Vec<RedemptionRecord>> {
        self.catalog
            .redemptions_for_customer(
                organization_id,
                customer_id,
                self.config.redemption_history_limit,
            )
            .await
    }

    // ─── Counter screen ────────────────────────────────────────────────────

    /// Loads a customer for the counter screen. Old read notifications are
    /// pruned first; a failed prune only logs.
    pub async fn open_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> LoyaltyResult<CustomerView> {
        if let Err(e) = self.notifier.cleanup_old(Utc::now()).await {
            warn!(error = %e, "Notification cleanup failed");
        }

        let organization = self
            .store
            .get_organization(organization_id)
            .await?
            .ok_or(LoyaltyError::NotFound {
                entity: "organization",
                id: organization_id,
            })?;
        let customer = self
            .store
            .get_customer(organization_id, customer_id)
            .await?
            .ok_or(LoyaltyError::NotFound {
                entity: "customer",
                id: customer_id,
            })?;

        self.events.publish(LoyaltyEvent::CustomerSelected {
            organization_id,
            customer_id,
            at: Utc::now(),
        });

        let pending_notification = self
            .notifier
            .pending_for_customer(organization_id, customer_id)
            .await?;
        let ladder = organization.effective_ladder();
        debug!(
            customer_id = %customer_id,
            pending = pending_notification.is_some(),
            "Customer opened"
        );

        Ok(CustomerView {
            tier: resolve_tier(customer.points, &ladder),
            next_tier: next_tier(customer.points, &ladder),
            tier_progress: tier_progress(customer.points, &ladder),
            pending_notification,
            customer,
        })
    }

    /// Dismisses the celebration for a customer of the organization.
    pub async fn clear_notifications(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> LoyaltyResult<usize> {
        Ok(self.notifier.clear(organization_id, customer_id).await?)
    }

    /// Periodic maintenance: drops read notifications past retention.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> LoyaltyResult<usize> {
        Ok(self.notifier.cleanup_old(now).await?)
    }
}
