//! Tier transitions: detect, persist, celebrate.
//!
//! Upgrades write the new tier, send the congratulation email, and leave an
//! unread notification row for the counter screen. Downgrades only write the
//! new tier. Email and notification failures are logged and swallowed; only
//! a failed tier write is reported.

use crate::store::{LoyaltyStore, StoreResult};
use crate::tiers::resolve_tier;
use chrono::{DateTime, Duration, Utc};
use omnily_core::channels::{EmailDispatcher, EmailRequest, TIER_UPGRADE_TEMPLATE};
use omnily_core::event_bus::{EventSink, LoyaltyEvent};
use omnily_core::loyalty::{TierChangeNotification, TierDefinition, TIER_UPGRADE_CATEGORY};
use omnily_core::types::{Customer, Organization};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the notifier needs about one balance change.
#[derive(Debug, Clone)]
pub struct TierChangeContext {
    pub organization_id: Uuid,
    pub organization_name: String,
    pub points_name: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub customer_email: Option<String>,
    /// Tier name currently cached on the customer row, when known.
    pub stored_tier: Option<String>,
    pub old_points: u64,
    pub new_points: u64,
    pub tiers: Vec<TierDefinition>,
}

impl TierChangeContext {
    pub fn new(
        organization: &Organization,
        customer: &Customer,
        old_points: u64,
        new_points: u64,
    ) -> Self {
        Self {
            organization_id: organization.id,
            organization_name: organization.name.clone(),
            points_name: organization.points_name.clone(),
            customer_id: customer.id,
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            stored_tier: Some(customer.tier.clone()),
            old_points,
            new_points,
            tiers: organization.effective_ladder(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TierChangeOutcome {
    pub tier_changed: bool,
    pub is_upgrade: bool,
    pub old_tier: TierDefinition,
    pub new_tier: TierDefinition,
}

pub struct TierChangeNotifier {
    store: Arc<dyn LoyaltyStore>,
    mailer: Arc<dyn EmailDispatcher>,
    events: Arc<dyn EventSink>,
    retention: Duration,
}

impl TierChangeNotifier {
    pub fn new(
        store: Arc<dyn LoyaltyStore>,
        mailer: Arc<dyn EmailDispatcher>,
        events: Arc<dyn EventSink>,
        retention_days: i64,
    ) -> Self {
        Self {
            store,
            mailer,
            events,
            retention: Duration::days(retention_days),
        }
    }

    pub async fn handle_tier_change(
        &self,
        ctx: &TierChangeContext,
    ) -> StoreResult<TierChangeOutcome> {
        let old_tier = resolve_tier(ctx.old_points, &ctx.tiers);
        let new_tier = resolve_tier(ctx.new_points, &ctx.tiers);

        if old_tier.name == new_tier.name {
            self.repair_stale_tier(ctx, &new_tier).await?;
            debug!(customer_id = %ctx.customer_id, tier = %old_tier.name, "Tier unchanged");
            return Ok(TierChangeOutcome {
                tier_changed: false,
                is_upgrade: false,
                old_tier,
                new_tier,
            });
        }

        let is_upgrade = new_tier.threshold > old_tier.threshold;

        self.store
            .set_customer_tier(ctx.organization_id, ctx.customer_id, &new_tier.name)
            .await?;

        self.events.publish(LoyaltyEvent::TierChanged {
            organization_id: ctx.organization_id,
            customer_id: ctx.customer_id,
            old_tier: old_tier.name.clone(),
            new_tier: new_tier.name.clone(),
            upgrade: is_upgrade,
            at: Utc::now(),
        });

        if is_upgrade {
            metrics::counter!("loyalty.tier_upgrades").increment(1);
            info!(
                customer_id = %ctx.customer_id,
                old = %old_tier.name,
                new = %new_tier.name,
                "Tier upgrade"
            );
            self.send_upgrade_email(ctx, &new_tier).await;
            self.save_upgrade_notification(ctx, &old_tier, &new_tier).await;
        } else {
            metrics::counter!("loyalty.tier_downgrades").increment(1);
            debug!(
                customer_id = %ctx.customer_id,
                old = %old_tier.name,
                new = %new_tier.name,
                "Tier downgrade"
            );
        }

        Ok(TierChangeOutcome {
            tier_changed: true,
            is_upgrade,
            old_tier,
            new_tier,
        })
    }

    /// Rewrites the cached tier when an earlier tier write was lost. Sends no
    /// email and leaves no notification.
    async fn repair_stale_tier(
        &self,
        ctx: &TierChangeContext,
        tier: &TierDefinition,
    ) -> StoreResult<()> {
        let Some(stored) = ctx.stored_tier.as_deref() else {
            return Ok(());
        };
        if stored == tier.name {
            return Ok(());
        }
        self.store
            .set_customer_tier(ctx.organization_id, ctx.customer_id, &tier.name)
            .await?;
        metrics::counter!("loyalty.tier_repairs").increment(1);
        warn!(
            customer_id = %ctx.customer_id,
            stored = %stored,
            resolved = %tier.name,
            "Stale customer tier repaired"
        );
        Ok(())
    }

    async fn send_upgrade_email(&self, ctx: &TierChangeContext, new_tier: &TierDefinition) {
        let Some(email) = ctx.customer_email.as_deref().filter(|e| !e.is_empty()) else {
            debug!(customer_id = %ctx.customer_id, "No email on file, skipping tier upgrade email");
            return;
        };

        let request = EmailRequest::new(
            TIER_UPGRADE_TEMPLATE,
            ctx.organization_id,
            email,
            &ctx.customer_name,
        )
        .var("customer_name", &ctx.customer_name)
        .var("organization_name", &ctx.organization_name)
        .var("tier_name", &new_tier.name)
        .var("tier_color", &new_tier.color)
        .var("points_name", &ctx.points_name);

        if let Err(e) = self.mailer.send(request).await {
            metrics::counter!("loyalty.tier_email_failures").increment(1);
            warn!(customer_id = %ctx.customer_id, error = %e, "Tier upgrade email failed");
        }
    }

    async fn save_upgrade_notification(
        &self,
        ctx: &TierChangeContext,
        old_tier: &TierDefinition,
        new_tier: &TierDefinition,
    ) {
        let notification = TierChangeNotification {
            id: Uuid::new_v4(),
            organization_id: ctx.organization_id,
            customer_id: ctx.customer_id,
            category: TIER_UPGRADE_CATEGORY.to_string(),
            title: format!("Congratulations! You are now {}!", new_tier.name),
            message: format!("You moved up from {} to {}.", old_tier.name, new_tier.name),
            old_tier_name: old_tier.name.clone(),
            new_tier_name: new_tier.name.clone(),
            new_tier_color: new_tier.color.clone(),
            new_tier_multiplier: new_tier.multiplier,
            is_read: false,
            created_at: Utc::now(),
            read_at: None,
        };

        if let Err(e) = self.store.insert_notification(notification).await {
            warn!(
                customer_id = %ctx.customer_id,
                error = %e,
                "Failed to save tier upgrade notification"
            );
        }
    }

    /// Most recent unread upgrade notification for the customer.
    pub async fn pending_for_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> StoreResult<Option<TierChangeNotification>> {
        self.store
            .latest_unread_notification(organization_id, customer_id)
            .await
    }

    /// Marks every unread upgrade notification of the customer read.
    pub async fn clear(&self, organization_id: Uuid, customer_id: Uuid) -> StoreResult<usize> {
        let cleared = self
            .store
            .mark_notifications_read(organization_id, customer_id, Utc::now())
            .await?;
        debug!(customer_id = %customer_id, cleared = cleared, "Tier upgrade notifications cleared");
        Ok(cleared)
    }

    /// Deletes read notifications older than the retention period.
    pub async fn cleanup_old(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let removed = self
            .store
            .delete_read_notifications_before(now - self.retention)
            .await?;
        if removed > 0 {
            metrics::counter!("loyalty.notifications_cleaned").increment(removed as u64);
            info!(removed = removed, "Cleaned up old tier upgrade notifications");
        }
        Ok(removed)
    }
}
