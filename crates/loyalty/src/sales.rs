//! Points accrual at the till and manual balance adjustments.

use crate::accrual::compute_points;
use crate::error::{LoyaltyError, LoyaltyResult};
use crate::notifier::{TierChangeContext, TierChangeNotifier, TierChangeOutcome};
use crate::store::{CustomerSaleUpdate, LoyaltyStore};
use crate::tiers::resolve_tier;
use chrono::Utc;
use omnily_core::event_bus::{EventSink, LoyaltyEvent};
use omnily_core::types::{Customer, Organization};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRequest {
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    /// Amount spent in the organization's currency.
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
}

/// What a sale would earn, shown on the customer display before confirming.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SalePreview {
    pub amount: f64,
    pub points: u64,
    pub tier: String,
    pub tier_multiplier: f64,
    pub category_multiplier: f64,
}

/// A committed sale. `tier_change` is `None` when the balance was written but
/// the tier write failed; the next balance change repairs the cached tier.
#[derive(Debug, Clone, Serialize)]
pub struct SaleOutcome {
    pub customer: Customer,
    pub points_earned: u64,
    pub new_balance: u64,
    pub tier_change: Option<TierChangeOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentOutcome {
    pub customer: Customer,
    pub delta: i64,
    pub reason: String,
    pub tier_change: Option<TierChangeOutcome>,
}

pub struct SaleRecorder {
    store: Arc<dyn LoyaltyStore>,
    notifier: Arc<TierChangeNotifier>,
    events: Arc<dyn EventSink>,
    default_points_per_unit: f64,
}

impl SaleRecorder {
    pub fn new(
        store: Arc<dyn LoyaltyStore>,
        notifier: Arc<TierChangeNotifier>,
        events: Arc<dyn EventSink>,
        default_points_per_unit: f64,
    ) -> Self {
        Self {
            store,
            notifier,
            events,
            default_points_per_unit,
        }
    }

    /// Computes the points for a sale without writing anything.
    pub async fn preview_sale(&self, request: &SaleRequest) -> LoyaltyResult<SalePreview> {
        validate_amount(request.amount)?;
        let (organization, customer) = self
            .load(request.organization_id, request.customer_id)
            .await?;
        let preview = self.price(&organization, &customer, request);

        self.events.publish(LoyaltyEvent::SalePreview {
            organization_id: organization.id,
            customer_id: customer.id,
            amount: request.amount,
            points: preview.points,
            at: Utc::now(),
        });
        debug!(customer_id = %customer.id, points = preview.points, "Sale preview");
        Ok(preview)
    }

    pub async fn record_sale(&self, request: &SaleRequest) -> LoyaltyResult<SaleOutcome> {
        validate_amount(request.amount)?;
        let (organization, customer) = self
            .load(request.organization_id, request.customer_id)
            .await?;
        let earned = self.price(&organization, &customer, request).points;

        let old_points = customer.points;
        let new_points = old_points.saturating_add(earned);
        let updated = self
            .store
            .record_customer_sale(
                organization.id,
                customer.id,
                CustomerSaleUpdate {
                    points: new_points,
                    total_spent: customer.total_spent + request.amount,
                    visits: customer.visits.saturating_add(1),
                    last_visit: Utc::now(),
                },
            )
            .await?;

        let tier_change = self
            .tier_check(&organization, &updated, old_points, new_points)
            .await;

        self.events.publish(LoyaltyEvent::SaleCelebration {
            organization_id: organization.id,
            customer_id: customer.id,
            points_earned: earned,
            new_balance: new_points,
            at: Utc::now(),
        });

        metrics::counter!("loyalty.sales_recorded").increment(1);
        metrics::counter!("loyalty.points_earned").increment(earned);
        info!(
            customer_id = %customer.id,
            amount = request.amount,
            earned = earned,
            balance = new_points,
            "Sale recorded"
        );

        Ok(SaleOutcome {
            customer: with_tier(updated, tier_change.as_ref()),
            points_earned: earned,
            new_balance: new_points,
            tier_change,
        })
    }

    /// Staff correction of a balance. Negative deltas may not overdraw.
    pub async fn adjust_points(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        delta: i64,
        reason: &str,
    ) -> LoyaltyResult<AdjustmentOutcome> {
        if delta == 0 {
            return Err(LoyaltyError::InvalidInput("adjustment must not be zero".into()));
        }
        let (organization, customer) = self.load(organization_id, customer_id).await?;

        let old_points = customer.points;
        let new_points = if delta < 0 {
            let requested = delta.unsigned_abs();
            old_points
                .checked_sub(requested)
                .ok_or(LoyaltyError::InsufficientPoints {
                    requested,
                    available: old_points,
                })?
        } else {
            old_points.saturating_add(delta as u64)
        };

        let updated = self
            .store
            .set_customer_points(organization_id, customer_id, new_points)
            .await?;
        let tier_change = self
            .tier_check(&organization, &updated, old_points, new_points)
            .await;

        metrics::counter!("loyalty.manual_adjustments").increment(1);
        info!(
            customer_id = %customer_id,
            delta = delta,
            reason = %reason,
            balance = new_points,
            "Points adjusted"
        );

        Ok(AdjustmentOutcome {
            customer: with_tier(updated, tier_change.as_ref()),
            delta,
            reason: reason.to_string(),
            tier_change,
        })
    }

    /// Runs after the balance write has committed, so a failed tier write is
    /// logged and reported as `None` instead of failing the whole call.
    async fn tier_check(
        &self,
        organization: &Organization,
        customer: &Customer,
        old_points: u64,
        new_points: u64,
    ) -> Option<TierChangeOutcome> {
        let ctx = TierChangeContext::new(organization, customer, old_points, new_points);
        match self.notifier.handle_tier_change(&ctx).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                metrics::counter!("loyalty.tier_update_failures").increment(1);
                warn!(
                    customer_id = %customer.id,
                    balance = new_points,
                    error = %e,
                    "Tier update failed after balance write"
                );
                None
            }
        }
    }

    fn price(
        &self,
        organization: &Organization,
        customer: &Customer,
        request: &SaleRequest,
    ) -> SalePreview {
        let rate = if organization.points_per_unit > 0.0 {
            organization.points_per_unit
        } else {
            self.default_points_per_unit
        };
        let tier = resolve_tier(customer.points, &organization.effective_ladder());
        let category_multiplier = organization.category_multiplier(request.category.as_deref());

        SalePreview {
            amount: request.amount,
            points: compute_points(request.amount, rate, tier.multiplier, category_multiplier),
            tier: tier.name,
            tier_multiplier: tier.multiplier,
            category_multiplier,
        }
    }

    async fn load(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> LoyaltyResult<(Organization, Customer)> {
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
        Ok((organization, customer))
    }
}

fn with_tier(mut customer: Customer, tier_change: Option<&TierChangeOutcome>) -> Customer {
    if let Some(change) = tier_change {
        customer.tier = change.new_tier.name.clone();
    }
    customer
}

fn validate_amount(amount: f64) -> LoyaltyResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LoyaltyError::InvalidInput(format!(
            "sale amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use omnily_core::channels::CaptureMailer;
    use omnily_core::event_bus::{capture_sink, CaptureSink};
    use crate::store::StoreOp;
    use omnily_core::loyalty::BonusCategory;

    struct Fixture {
        store: Arc<InMemoryStore>,
        mailer: Arc<CaptureMailer>,
        events: Arc<CaptureSink>,
        recorder: SaleRecorder,
        org: Organization,
        customer: Customer,
    }

    fn fixture(points: u64) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let mailer = Arc::new(CaptureMailer::new());
        let events = capture_sink();
        let org = Organization {
            id: Uuid::new_v4(),
            name: "Caffè Roma".into(),
            points_per_unit: 1.0,
            points_name: "Punti".into(),
            loyalty_tiers: Vec::new(),
            bonus_categories: vec![BonusCategory {
                category: "beans".into(),
                multiplier: 2.0,
            }],
        };
        let mut customer = Customer::new(org.id, "Ada", Some("ada@example.com".into()));
        customer.points = points;
        store.insert_organization(org.clone());
        store.insert_customer(customer.clone());
        let notifier = Arc::new(TierChangeNotifier::new(
            store.clone(),
            mailer.clone(),
            events.clone(),
            7,
        ));
        let recorder = SaleRecorder::new(store.clone(), notifier, events.clone(), 1.0);
        Fixture {
            store,
            mailer,
            events,
            recorder,
            org,
            customer,
        }
    }

    fn sale(f: &Fixture, amount: f64, category: Option<&str>) -> SaleRequest {
        SaleRequest {
            organization_id: f.org.id,
            customer_id: f.customer.id,
            amount,
            category: category.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_preview_writes_nothing() {
        let f = fixture(250);
        let preview = f.recorder.preview_sale(&sale(&f, 10.0, Some("beans"))).await.unwrap();
        // 10 * 1.0 * 1.2 (Silver) * 2.0
        assert_eq!(preview.points, 24);
        assert_eq!(preview.tier, "Silver");
        let stored = f.store.get_customer(f.org.id, f.customer.id).await.unwrap().unwrap();
        assert_eq!(stored.points, 250);
        assert_eq!(f.events.count_kind("sale_preview"), 1);
    }

    #[tokio::test]
    async fn test_record_sale_updates_customer() {
        let f = fixture(100);
        let outcome = f.recorder.record_sale(&sale(&f, 42.5, None)).await.unwrap();
        assert_eq!(outcome.points_earned, 42);
        assert_eq!(outcome.new_balance, 142);
        assert_eq!(outcome.customer.visits, 1);
        assert_eq!(outcome.customer.total_spent, 42.5);
        assert!(outcome.customer.last_visit.is_some());
        assert!(!outcome.tier_change.unwrap().tier_changed);
        assert_eq!(f.events.count_kind("sale_celebration"), 1);
    }

    #[tokio::test]
    async fn test_sale_crossing_threshold_upgrades() {
        let f = fixture(190);
        let outcome = f.recorder.record_sale(&sale(&f, 20.0, None)).await.unwrap();
        assert!(outcome.tier_change.unwrap().is_upgrade);
        assert_eq!(outcome.customer.tier, "Silver");
        assert_eq!(f.mailer.count(), 1);
        assert_eq!(f.store.notification_count(), 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_amount() {
        let f = fixture(0);
        for amount in [0.0, -5.0, f64::NAN] {
            assert!(matches!(
                f.recorder.record_sale(&sale(&f, amount, None)).await,
                Err(LoyaltyError::InvalidInput(_))
            ));
        }
        assert_eq!(f.events.count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_customer() {
        let f = fixture(0);
        let mut request = sale(&f, 10.0, None);
        request.customer_id = Uuid::new_v4();
        assert!(matches!(
            f.recorder.record_sale(&request).await,
            Err(LoyaltyError::NotFound { entity: "customer", .. })
        ));
    }

    #[tokio::test]
    async fn test_adjust_points() {
        let f = fixture(520);
        let outcome = f
            .recorder
            .adjust_points(f.org.id, f.customer.id, -100, "wrong receipt")
            .await
            .unwrap();
        assert_eq!(outcome.customer.points, 420);
        assert_eq!(outcome.customer.tier, "Silver");
        assert!(!outcome.tier_change.unwrap().is_upgrade);
        assert_eq!(f.mailer.count(), 0);

        assert!(matches!(
            f.recorder.adjust_points(f.org.id, f.customer.id, -1000, "typo").await,
            Err(LoyaltyError::InsufficientPoints { requested: 1000, available: 420 })
        ));
        assert!(matches!(
            f.recorder.adjust_points(f.org.id, f.customer.id, 0, "noop").await,
            Err(LoyaltyError::InvalidInput(_))
        ));
    }

    async fn stored(f: &Fixture) -> Customer {
        f.store
            .get_customer(f.org.id, f.customer.id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_failed_tier_write_keeps_committed_sale() {
        let f = fixture(190);
        f.store.fail_on(StoreOp::SetCustomerTier);

        let outcome = f.recorder.record_sale(&sale(&f, 20.0, None)).await.unwrap();
        assert_eq!(outcome.new_balance, 210);
        assert!(outcome.tier_change.is_none());
        assert_eq!(outcome.customer.tier, "Bronze");
        assert_eq!(f.events.count_kind("sale_celebration"), 1);

        let customer = stored(&f).await;
        assert_eq!(customer.points, 210);
        assert_eq!(customer.visits, 1);
    }

    #[tokio::test]
    async fn test_next_sale_repairs_stale_tier() {
        let f = fixture(190);
        f.store.fail_on(StoreOp::SetCustomerTier);
        f.recorder.record_sale(&sale(&f, 20.0, None)).await.unwrap();
        f.store.clear_failures();

        let outcome = f.recorder.record_sale(&sale(&f, 20.0, None)).await.unwrap();
        let change = outcome.tier_change.unwrap();
        assert!(!change.tier_changed);
        assert_eq!(outcome.customer.tier, "Silver");

        let customer = stored(&f).await;
        // 210 points earn 20 * 1.2 at Silver.
        assert_eq!(customer.points, 234);
        assert_eq!(customer.visits, 2);
        assert_eq!(customer.tier, "Silver");
    }

    #[tokio::test]
    async fn test_failed_tier_write_keeps_adjustment() {
        let f = fixture(480);
        f.store.fail_on(StoreOp::SetCustomerTier);
        let outcome = f
            .recorder
            .adjust_points(f.org.id, f.customer.id, 50, "birthday bonus")
            .await
            .unwrap();
        assert!(outcome.tier_change.is_none());
        assert_eq!(stored(&f).await.points, 530);

        f.store.clear_failures();
        let outcome = f
            .recorder
            .adjust_points(f.org.id, f.customer.id, 10, "survey")
            .await
            .unwrap();
        assert_eq!(outcome.customer.tier, "Gold");
        assert_eq!(stored(&f).await.tier, "Gold");
    }
}
