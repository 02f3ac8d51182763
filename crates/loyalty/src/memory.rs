//! In-memory loyalty store backed by DashMap.
//!
//! Same surface as the hosted database, for development and tests.
//! Conditional operations run under the row's shard lock, so they are atomic
//! with respect to other callers of this store.

use crate::store::{CustomerSaleUpdate, LoyaltyStore, StoreError, StoreOp, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use omnily_core::loyalty::{
    BonusCategory, RedemptionRecord, RedemptionStatus, Reward, RewardKind, TierChangeNotification,
};
use omnily_core::types::{Customer, Organization};
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    organizations: DashMap<Uuid, Organization>,
    customers: DashMap<Uuid, Customer>,
    rewards: DashMap<Uuid, Reward>,
    redemptions: DashMap<Uuid, RedemptionRecord>,
    notifications: DashMap<Uuid, TierChangeNotification>,
    failing: Mutex<HashSet<StoreOp>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one demo organization, two customers and a few rewards.
    pub fn with_demo_data() -> Self {
        let store = Self::new();
        let org_id = store.seed_demo_data();
        info!(organization_id = %org_id, "Loyalty store initialized (in-memory, demo data)");
        store
    }

    pub fn insert_organization(&self, organization: Organization) {
        self.organizations.insert(organization.id, organization);
    }

    pub fn insert_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    /// Makes every subsequent call of `op` fail with `Unavailable`.
    pub fn fail_on(&self, op: StoreOp) {
        self.failing.lock().insert(op);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.len()
    }

    pub fn redemption_count(&self) -> usize {
        self.redemptions.len()
    }

    fn check(&self, op: StoreOp) -> StoreResult<()> {
        if self.failing.lock().contains(&op) {
            return Err(StoreError::Unavailable(format!("injected failure on {op:?}")));
        }
        Ok(())
    }

    fn seed_demo_data(&self) -> Uuid {
        let now = Utc::now();
        let org = Organization {
            id: Uuid::new_v4(),
            name: "Demo Bakery".to_string(),
            points_per_unit: 1.0,
            points_name: "Points".to_string(),
            loyalty_tiers: Vec::new(),
            bonus_categories: vec![BonusCategory {
                category: "Cakes".to_string(),
                multiplier: 2.0,
            }],
        };
        let org_id = org.id;
        self.insert_organization(org);

        let mut regular = Customer::new(
            org_id,
            "Giulia Bianchi",
            Some("giulia@example.com".to_string()),
        );
        regular.points = 180;
        regular.total_spent = 180.0;
        regular.visits = 12;
        let walk_in = Customer::new(org_id, "Marco Rossi", None);
        for customer in [regular, walk_in] {
            info!(customer_id = %customer.id, name = %customer.name, "Demo customer seeded");
            self.insert_customer(customer);
        }

        let demo_rewards = [
            ("Free coffee", RewardKind::FreeProduct("Coffee".to_string()), 100, None, None),
            ("10% off", RewardKind::Discount(10.0), 150, None, None),
            ("Gift card 20", RewardKind::GiftCard(20.0), 500, Some("Gold".to_string()), Some(5)),
        ];
        for (name, kind, points_required, required_tier, stock_quantity) in demo_rewards {
            let reward = Reward {
                id: Uuid::new_v4(),
                organization_id: org_id,
                name: name.to_string(),
                kind,
                description: String::new(),
                points_required,
                required_tier,
                stock_quantity,
                is_active: true,
                valid_from: None,
                valid_until: None,
                terms_conditions: None,
                created_at: now,
                updated_at: now,
            };
            self.rewards.insert(reward.id, reward);
        }
        org_id
    }
}

fn customer_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound {
        entity: "customer",
        id,
    }
}

fn reward_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound {
        entity: "reward",
        id,
    }
}

#[async_trait]
impl LoyaltyStore for InMemoryStore {
    async fn get_organization(&self, organization_id: Uuid) -> StoreResult<Option<Organization>> {
        self.check(StoreOp::GetOrganization)?;
        Ok(self.organizations.get(&organization_id).map(|r| r.value().clone()))
    }

    async fn get_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> StoreResult<Option<Customer>> {
        self.check(StoreOp::GetCustomer)?;
        Ok(self
            .customers
            .get(&customer_id)
            .filter(|c| c.organization_id == organization_id)
            .map(|r| r.value().clone()))
    }

    async fn set_customer_points(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        points: u64,
    ) -> StoreResult<Customer> {
        self.check(StoreOp::SetCustomerPoints)?;
        let mut entry = self
            .customers
            .get_mut(&customer_id)
            .filter(|c| c.organization_id == organization_id)
            .ok_or_else(|| customer_not_found(customer_id))?;
        let c = entry.value_mut();
        c.points = points;
        c.updated_at = Utc::now();
        Ok(c.clone())
    }

    async fn deduct_customer_points(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        cost: u64,
    ) -> StoreResult<Option<u64>> {
        self.check(StoreOp::DeductCustomerPoints)?;
        let mut entry = self
            .customers
            .get_mut(&customer_id)
            .filter(|c| c.organization_id == organization_id)
            .ok_or_else(|| customer_not_found(customer_id))?;
        let c = entry.value_mut();
        if c.points < cost {
            return Ok(None);
        }
        c.points -= cost;
        c.updated_at = Utc::now();
        Ok(Some(c.points))
    }

    async fn record_customer_sale(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        update: CustomerSaleUpdate,
    ) -> StoreResult<Customer> {
        self.check(StoreOp::RecordCustomerSale)?;
        let mut entry = self
            .customers
            .get_mut(&customer_id)
            .filter(|c| c.organization_id == organization_id)
            .ok_or_else(|| customer_not_found(customer_id))?;
        let c = entry.value_mut();
        c.points = update.points;
        c.total_spent = update.total_spent;
        c.visits = update.visits;
        c.last_visit = Some(update.last_visit);
        c.updated_at = Utc::now();
        Ok(c.clone())
    }

    async fn set_customer_tier(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        tier: &str,
    ) -> StoreResult<()> {
        self.check(StoreOp::SetCustomerTier)?;
        let mut entry = self
            .customers
            .get_mut(&customer_id)
            .filter(|c| c.organization_id == organization_id)
            .ok_or_else(|| customer_not_found(customer_id))?;
        entry.value_mut().tier = tier.to_string();
        entry.value_mut().updated_at = Utc::now();
        Ok(())
    }

    async fn get_reward(
        &self,
        organization_id: Uuid,
        reward_id: Uuid,
    ) -> StoreResult<Option<Reward>> {
        self.check(StoreOp::GetReward)?;
        Ok(self
            .rewards
            .get(&reward_id)
            .filter(|r| r.organization_id == organization_id)
            .map(|r| r.value().clone()))
    }

    async fn list_rewards(&self, organization_id: Uuid) -> StoreResult<Vec<Reward>> {
        self.check(StoreOp::ListRewards)?;
        Ok(self
            .rewards
            .iter()
            .filter(|r| r.organization_id == organization_id)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn insert_reward(&self, reward: Reward) -> StoreResult<Reward> {
        self.check(StoreOp::InsertReward)?;
        if self.rewards.contains_key(&reward.id) {
            return Err(StoreError::Rejected(format!("reward {} already exists", reward.id)));
        }
        self.rewards.insert(reward.id, reward.clone());
        Ok(reward)
    }

    async fn update_reward(&self, reward: Reward) -> StoreResult<Reward> {
        self.check(StoreOp::UpdateReward)?;
        let mut entry = self
            .rewards
            .get_mut(&reward.id)
            .filter(|r| r.organization_id == reward.organization_id)
            .ok_or_else(|| reward_not_found(reward.id))?;
        *entry.value_mut() = reward.clone();
        Ok(reward)
    }

    async fn delete_reward(&self, organization_id: Uuid, reward_id: Uuid) -> StoreResult<bool> {
        self.check(StoreOp::DeleteReward)?;
        Ok(self
            .rewards
            .remove_if(&reward_id, |_, r| r.organization_id == organization_id)
            .is_some())
    }

    async fn set_reward_stock(
        &self,
        organization_id: Uuid,
        reward_id: Uuid,
        stock: u32,
    ) -> StoreResult<()> {
        self.check(StoreOp::SetRewardStock)?;
        let mut entry = self
            .rewards
            .get_mut(&reward_id)
            .filter(|r| r.organization_id == organization_id)
            .ok_or_else(|| reward_not_found(reward_id))?;
        entry.value_mut().stock_quantity = Some(stock);
        entry.value_mut().updated_at = Utc::now();
        Ok(())
    }

    async fn decrement_reward_stock(
        &self,
        organization_id: Uuid,
        reward_id: Uuid,
    ) -> StoreResult<Option<u32>> {
        self.check(StoreOp::DecrementRewardStock)?;
        let mut entry = self
            .rewards
            .get_mut(&reward_id)
            .filter(|r| r.organization_id == organization_id)
            .ok_or_else(|| reward_not_found(reward_id))?;
        let r = entry.value_mut();
        match r.stock_quantity {
            Some(0) => Ok(None),
            Some(q) => {
                r.stock_quantity = Some(q - 1);
                r.updated_at = Utc::now();
                Ok(Some(q - 1))
            }
            // Unlimited stock has nothing to decrement.
            None => Ok(Some(u32::MAX)),
        }
    }

    async fn insert_redemption(&self, record: RedemptionRecord) -> StoreResult<RedemptionRecord> {
        self.check(StoreOp::InsertRedemption)?;
        self.redemptions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_redemption(
        &self,
        organization_id: Uuid,
        redemption_id: Uuid,
    ) -> StoreResult<Option<RedemptionRecord>> {
        self.check(StoreOp::GetRedemption)?;
        Ok(self
            .redemptions
            .get(&redemption_id)
            .filter(|r| r.organization_id == organization_id)
            .map(|r| r.value().clone()))
    }

    async fn list_redemptions(
        &self,
        organization_id: Uuid,
        customer_id: Option<Uuid>,
    ) -> StoreResult<Vec<RedemptionRecord>> {
        self.check(StoreOp::ListRedemptions)?;
        Ok(self
            .redemptions
            .iter()
            .filter(|r| r.organization_id == organization_id)
            .filter(|r| customer_id.map(|c| r.customer_id == c).unwrap_or(true))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn set_redemption_status(
        &self,
        organization_id: Uuid,
        redemption_id: Uuid,
        status: RedemptionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<RedemptionRecord> {
        self.check(StoreOp::SetRedemptionStatus)?;
        let mut entry = self
            .redemptions
            .get_mut(&redemption_id)
            .filter(|r| r.organization_id == organization_id)
            .ok_or(StoreError::NotFound {
                entity: "redemption",
                id: redemption_id,
            })?;
        let r = entry.value_mut();
        r.status = status;
        if status == RedemptionStatus::Used {
            r.used_at = Some(at);
        }
        Ok(r.clone())
    }

    async fn insert_notification(
        &self,
        notification: TierChangeNotification,
    ) -> StoreResult<TierChangeNotification> {
        self.check(StoreOp::InsertNotification)?;
        self.notifications.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn latest_unread_notification(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> StoreResult<Option<TierChangeNotification>> {
        self.check(StoreOp::LatestUnreadNotification)?;
        Ok(self
            .notifications
            .iter()
            .filter(|n| {
                n.organization_id == organization_id && n.customer_id == customer_id && !n.is_read
            })
            .max_by_key(|n| n.created_at)
            .map(|n| n.value().clone()))
    }

    async fn mark_notifications_read(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<usize> {
        self.check(StoreOp::MarkNotificationsRead)?;
        let mut marked = 0;
        for mut entry in self.notifications.iter_mut() {
            let n = entry.value_mut();
            if n.organization_id == organization_id && n.customer_id == customer_id && !n.is_read {
                n.is_read = true;
                n.read_at = Some(at);
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn delete_read_notifications_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        self.check(StoreOp::DeleteReadNotifications)?;
        let before = self.notifications.len();
        self.notifications.retain(|_, n| !(n.is_read && n.created_at < cutoff));
        Ok(before - self.notifications.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_customer(points: u64) -> (InMemoryStore, Uuid, Uuid) {
        let store = InMemoryStore::new();
        let org = Uuid::new_v4();
        let mut customer = Customer::new(org, "Ada", None);
        customer.points = points;
        let customer_id = customer.id;
        store.insert_customer(customer);
        (store, org, customer_id)
    }

    #[tokio::test]
    async fn test_customer_scoped_by_organization() {
        let (store, org, id) = store_with_customer(10);
        assert!(store.get_customer(org, id).await.unwrap().is_some());
        assert!(store.get_customer(Uuid::new_v4(), id).await.unwrap().is_none());
        assert!(matches!(
            store.set_customer_points(Uuid::new_v4(), id, 5).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_conditional_deduct() {
        let (store, org, id) = store_with_customer(120);
        assert_eq!(store.deduct_customer_points(org, id, 100).await.unwrap(), Some(20));
        assert_eq!(store.deduct_customer_points(org, id, 100).await.unwrap(), None);
        let c = store.get_customer(org, id).await.unwrap().unwrap();
        assert_eq!(c.points, 20);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let (store, org, id) = store_with_customer(10);
        store.fail_on(StoreOp::GetCustomer);
        assert!(matches!(
            store.get_customer(org, id).await,
            Err(StoreError::Unavailable(_))
        ));
        store.clear_failures();
        assert!(store.get_customer(org, id).await.is_ok());
    }

    #[tokio::test]
    async fn test_demo_data_seeded() {
        let store = InMemoryStore::with_demo_data();
        let org = store.organizations.iter().next().map(|o| o.id).unwrap();
        assert_eq!(store.list_rewards(org).await.unwrap().len(), 3);
    }
}
