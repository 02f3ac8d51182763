//! Reward catalog management and the redemption ledger.

use crate::error::{LoyaltyError, LoyaltyResult};
use crate::store::LoyaltyStore;
use crate::tiers::find_tier;
use chrono::{DateTime, Duration, Utc};
use omnily_core::loyalty::{RedemptionRecord, RedemptionStatus, Reward, RewardKind, TierDefinition};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardInput {
    pub name: String,
    pub kind: RewardKind,
    #[serde(default)]
    pub description: String,
    pub points_required: u64,
    #[serde(default)]
    pub required_tier: Option<String>,
    #[serde(default)]
    pub stock_quantity: Option<u32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub terms_conditions: Option<String>,
}

fn default_active() -> bool {
    true
}

/// Partial update. For nullable fields, an explicit `null` clears the value
/// and an absent field leaves it untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardUpdate {
    pub name: Option<String>,
    pub kind: Option<RewardKind>,
    pub description: Option<String>,
    pub points_required: Option<u64>,
    #[serde(default, deserialize_with = "double_option")]
    pub required_tier: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub stock_quantity: Option<Option<u32>>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub valid_from: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub valid_until: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub terms_conditions: Option<Option<String>>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RewardStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub new_last_30_days: usize,
    pub average_points: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RedemptionStats {
    pub total: usize,
    pub total_points_spent: u64,
    pub last_30_days: usize,
    pub redeemed: usize,
    pub used: usize,
    pub expired: usize,
    pub cancelled: usize,
}

pub struct RewardCatalog {
    store: Arc<dyn LoyaltyStore>,
}

impl RewardCatalog {
    pub fn new(store: Arc<dyn LoyaltyStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, organization_id: Uuid, input: RewardInput) -> LoyaltyResult<Reward> {
        validate(&input.name, input.points_required, input.valid_from, input.valid_until)?;
        let now = Utc::now();
        let reward = Reward {
            id: Uuid::new_v4(),
            organization_id,
            name: input.name.trim().to_string(),
            kind: input.kind,
            description: input.description,
            points_required: input.points_required,
            required_tier: input.required_tier.filter(|t| !t.is_empty()),
            stock_quantity: input.stock_quantity,
            is_active: input.is_active,
            valid_from: input.valid_from,
            valid_until: input.valid_until,
            terms_conditions: input.terms_conditions,
            created_at: now,
            updated_at: now,
        };
        let reward = self.store.insert_reward(reward).await?;
        metrics::counter!("loyalty.rewards_created").increment(1);
        info!(reward_id = %reward.id, name = %reward.name, "Reward created");
        Ok(reward)
    }

    pub async fn update(
        &self,
        organization_id: Uuid,
        reward_id: Uuid,
        update: RewardUpdate,
    ) -> LoyaltyResult<Reward> {
        let mut r = self.get(organization_id, reward_id).await?;
        if let Some(name) = update.name {
            r.name = name.trim().to_string();
        }
        if let Some(kind) = update.kind {
            r.kind = kind;
        }
        if let Some(description) = update.description {
            r.description = description;
        }
        if let Some(points) = update.points_required {
            r.points_required = points;
        }
        if let Some(tier) = update.required_tier {
            r.required_tier = tier.filter(|t| !t.is_empty());
        }
        if let Some(stock) = update.stock_quantity {
            r.stock_quantity = stock;
        }
        if let Some(active) = update.is_active {
            r.is_active = active;
        }
        if let Some(from) = update.valid_from {
            r.valid_from = from;
        }
        if let Some(until) = update.valid_until {
            r.valid_until = until;
        }
        if let Some(terms) = update.terms_conditions {
            r.terms_conditions = terms;
        }
        validate(&r.name, r.points_required, r.valid_from, r.valid_until)?;
        r.updated_at = Utc::now();
        let reward = self.store.update_reward(r).await?;
        debug!(reward_id = %reward.id, "Reward updated");
        Ok(reward)
    }

    pub async fn toggle(
        &self,
        organization_id: Uuid,
        reward_id: Uuid,
        is_active: bool,
    ) -> LoyaltyResult<Reward> {
        self.update(
            organization_id,
            reward_id,
            RewardUpdate {
                is_active: Some(is_active),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete(&self, organization_id: Uuid, reward_id: Uuid) -> LoyaltyResult<()> {
        if self.store.delete_reward(organization_id, reward_id).await? {
            info!(reward_id = %reward_id, "Reward deleted");
            Ok(())
        } else {
            Err(LoyaltyError::NotFound {
                entity: "reward",
                id: reward_id,
            })
        }
    }

    pub async fn get(&self, organization_id: Uuid, reward_id: Uuid) -> LoyaltyResult<Reward> {
        self.store
            .get_reward(organization_id, reward_id)
            .await?
            .ok_or(LoyaltyError::NotFound {
                entity: "reward",
                id: reward_id,
            })
    }

    /// Newest first.
    pub async fn list_all(&self, organization_id: Uuid) -> LoyaltyResult<Vec<Reward>> {
        let mut rewards = self.store.list_rewards(organization_id).await?;
        rewards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rewards)
    }

    /// Active rewards, cheapest first.
    pub async fn list_active(&self, organization_id: Uuid) -> LoyaltyResult<Vec<Reward>> {
        let mut rewards: Vec<Reward> = self
            .store
            .list_rewards(organization_id)
            .await?
            .into_iter()
            .filter(|r| r.is_active)
            .collect();
        rewards.sort_by_key(|r| r.points_required);
        Ok(rewards)
    }

    /// Rewards the customer could redeem right now.
    pub async fn available_for_customer(
        &self,
        organization_id: Uuid,
        customer_points: u64,
        customer_tier: Option<&str>,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<Vec<Reward>> {
        let ladder = match customer_tier {
            Some(_) => Some(self.ladder(organization_id).await?),
            None => None,
        };

        Ok(self
            .list_active(organization_id)
            .await?
            .into_iter()
            .filter(|r| r.points_required <= customer_points)
            .filter(|r| r.in_stock())
            .filter(|r| r.window_contains(now))
            .filter(|r| match (&r.required_tier, customer_tier, &ladder) {
                (Some(required), Some(tier), Some(ladder)) => tier_allows(tier, required, ladder),
                _ => true,
            })
            .collect())
    }

    pub async fn stats(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<RewardStats> {
        let rewards = self.store.list_rewards(organization_id).await?;
        let month_ago = now - Duration::days(30);

        let kinds = ["discount", "freeProduct", "cashback", "giftCard"];
        let mut by_kind: BTreeMap<String, usize> = kinds
            .iter()
            .map(|k| (k.to_string(), 0))
            .collect();
        for r in &rewards {
            *by_kind.entry(r.kind.type_name().to_string()).or_default() += 1;
        }

        let active = rewards.iter().filter(|r| r.is_active).count();
        let average_points = if rewards.is_empty() {
            0
        } else {
            let sum: u64 = rewards.iter().map(|r| r.points_required).sum();
            (sum as f64 / rewards.len() as f64).round() as u64
        };

        Ok(RewardStats {
            total: rewards.len(),
            active,
            inactive: rewards.len() - active,
            by_kind,
            new_last_30_days: rewards.iter().filter(|r| r.created_at >= month_ago).count(),
            average_points,
        })
    }

    // ─── Redemption ledger ─────────────────────────────────────────────────

    /// Newest first, at most `limit` entries.
    pub async fn redemptions_for_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        limit: usize,
    ) -> LoyaltyResult<Vec<RedemptionRecord>> {
        let mut records = self
            .store
            .list_redemptions(organization_id, Some(customer_id))
            .await?;
        records.sort_by(|a, b| b.redeemed_at.cmp(&a.redeemed_at));
        records.truncate(limit);
        Ok(records)
    }

    pub async fn redemption_stats(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<RedemptionStats> {
        let records = self.store.list_redemptions(organization_id, None).await?;
        let month_ago = now - Duration::days(30);
        let count = |status: RedemptionStatus| {
            records.iter().filter(|r| r.status == status).count()
        };

        Ok(RedemptionStats {
            total: records.len(),
            total_points_spent: records.iter().map(|r| r.points_spent).sum(),
            last_30_days: records.iter().filter(|r| r.redeemed_at >= month_ago).count(),
            redeemed: count(RedemptionStatus::Redeemed),
            used: count(RedemptionStatus::Used),
            expired: count(RedemptionStatus::Expired),
            cancelled: count(RedemptionStatus::Cancelled),
        })
    }

    /// Counter-side scan: `redeemed → used`. Any other starting status is rejected.
    pub async fn mark_redemption_used(
        &self,
        organization_id: Uuid,
        redemption_id: Uuid,
    ) -> LoyaltyResult<RedemptionRecord> {
        let record = self
            .store
            .get_redemption(organization_id, redemption_id)
            .await?
            .ok_or(LoyaltyError::NotFound {
                entity: "redemption",
                id: redemption_id,
            })?;

        if record.status != RedemptionStatus::Redeemed {
            return Err(LoyaltyError::InvalidTransition(format!(
                "redemption {redemption_id} is {:?}, only redeemed rewards can be used",
                record.status
            )));
        }

        let record = self
            .store
            .set_redemption_status(
                organization_id,
                redemption_id,
                RedemptionStatus::Used,
                Utc::now(),
            )
            .await?;
        info!(redemption_id = %redemption_id, "Redemption marked used");
        Ok(record)
    }

    async fn ladder(&self, organization_id: Uuid) -> LoyaltyResult<Vec<TierDefinition>> {
        Ok(self
            .store
            .get_organization(organization_id)
            .await?
            .ok_or(LoyaltyError::NotFound {
                entity: "organization",
                id: organization_id,
            })?
            .effective_ladder())
    }
}

fn validate(
    name: &str,
    points_required: u64,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
) -> LoyaltyResult<()> {
    if name.trim().is_empty() {
        return Err(LoyaltyError::InvalidInput("reward name must not be empty".into()));
    }
    if points_required == 0 {
        return Err(LoyaltyError::InvalidInput("points_required must be positive".into()));
    }
    if let (Some(from), Some(until)) = (valid_from, valid_until) {
        if from > until {
            return Err(LoyaltyError::InvalidInput("valid_from is after valid_until".into()));
        }
    }
    Ok(())
}

/// Unknown tier names on either side exclude the reward.
fn tier_allows(customer_tier: &str, required_tier: &str, ladder: &[TierDefinition]) -> bool {
    match (find_tier(customer_tier, ladder), find_tier(required_tier, ladder)) {
        (Some(customer), Some(required)) => customer.threshold >= required.threshold,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use omnily_core::types::Organization;

    fn setup() -> (Arc<InMemoryStore>, RewardCatalog, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let org = Organization {
            id: Uuid::new_v4(),
            name: "Caffè Roma".into(),
            points_per_unit: 1.0,
            points_name: "Punti".into(),
            loyalty_tiers: Vec::new(),
            bonus_categories: Vec::new(),
        };
        let org_id = org.id;
        store.insert_organization(org);
        let catalog = RewardCatalog::new(store.clone());
        (store, catalog, org_id)
    }

    fn input(name: &str, points: u64) -> RewardInput {
        RewardInput {
            name: name.into(),
            kind: RewardKind::Discount(10.0),
            description: String::new(),
            points_required: points,
            required_tier: None,
            stock_quantity: None,
            is_active: true,
            valid_from: None,
            valid_until: None,
            terms_conditions: None,
        }
    }

    #[tokio::test]
    async fn test_create_validates() {
        let (_, catalog, org) = setup();
        assert!(matches!(
            catalog.create(org, input("  ", 10)).await,
            Err(LoyaltyError::InvalidInput(_))
        ));
        assert!(matches!(
            catalog.create(org, input("Free tea", 0)).await,
            Err(LoyaltyError::InvalidInput(_))
        ));
        let reward = catalog.create(org, input(" Free tea ", 40)).await.unwrap();
        assert_eq!(reward.name, "Free tea");
    }

    #[tokio::test]
    async fn test_update_toggle_delete() {
        let (_, catalog, org) = setup();
        let reward = catalog.create(org, input("Free tea", 40)).await.unwrap();

        let updated = catalog
            .update(
                org,
                reward.id,
                RewardUpdate {
                    points_required: Some(60),
                    stock_quantity: Some(Some(4)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.points_required, 60);
        assert_eq!(updated.stock_quantity, Some(4));

        let toggled = catalog.toggle(org, reward.id, false).await.unwrap();
        assert!(!toggled.is_active);
        assert!(catalog.list_active(org).await.unwrap().is_empty());

        catalog.delete(org, reward.id).await.unwrap();
        assert!(matches!(
            catalog.delete(org, reward.id).await,
            Err(LoyaltyError::NotFound { .. })
        ));
    }

    #[test]
    fn test_update_null_clears_field() {
        let update: RewardUpdate =
            serde_json::from_value(serde_json::json!({"stock_quantity": null})).unwrap();
        assert_eq!(update.stock_quantity, Some(None));
        let update: RewardUpdate = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(update.stock_quantity, None);
    }

    #[tokio::test]
    async fn test_available_for_customer_filters() {
        let (_, catalog, org) = setup();
        let now = Utc::now();
        catalog.create(org, input("Cheap", 50)).await.unwrap();
        catalog.create(org, input("Expensive", 900)).await.unwrap();
        let mut sold_out = input("Sold out", 10);
        sold_out.stock_quantity = Some(0);
        catalog.create(org, sold_out).await.unwrap();
        let mut expired = input("Expired", 10);
        expired.valid_until = Some(now - Duration::days(1));
        catalog.create(org, expired).await.unwrap();
        let mut gold = input("Gold only", 20);
        gold.required_tier = Some("Gold".into());
        catalog.create(org, gold).await.unwrap();

        let names = |rewards: Vec<Reward>| rewards.into_iter().map(|r| r.name).collect::<Vec<_>>();

        let silver = catalog.available_for_customer(org, 300, Some("Silver"), now).await.unwrap();
        assert_eq!(names(silver), vec!["Cheap"]);

        let gold_customer = catalog
            .available_for_customer(org, 600, Some("Gold"), now)
            .await
            .unwrap();
        assert_eq!(names(gold_customer), vec!["Gold only", "Cheap"]);

        let unknown = catalog.available_for_customer(org, 600, Some("Mystery"), now).await.unwrap();
        assert_eq!(names(unknown), vec!["Cheap"]);
    }

    #[tokio::test]
    async fn test_stats() {
        let (_, catalog, org) = setup();
        catalog.create(org, input("A", 100)).await.unwrap();
        let mut b = input("B", 51);
        b.kind = RewardKind::GiftCard(20.0);
        b.is_active = false;
        catalog.create(org, b).await.unwrap();

        let stats = catalog.stats(org, Utc::now()).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.inactive, 1);
        assert_eq!(stats.by_kind["giftCard"], 1);
        assert_eq!(stats.by_kind["cashback"], 0);
        assert_eq!(stats.new_last_30_days, 2);
        assert_eq!(stats.average_points, 76);
    }

    #[tokio::test]
    async fn test_mark_used_transition() {
        let (store, catalog, org) = setup();
        let record = RedemptionRecord {
            id: Uuid::new_v4(),
            organization_id: org,
            customer_id: Uuid::new_v4(),
            reward_id: Uuid::new_v4(),
            reward_name: "Free tea".into(),
            reward_type: "freeProduct".into(),
            reward_value: "Tea".into(),
            points_spent: 40,
            customer_points_before: 100,
            customer_points_after: 60,
            customer_tier: None,
            status: RedemptionStatus::Redeemed,
            redeemed_at: Utc::now(),
            used_at: None,
        };
        store.insert_redemption(record.clone()).await.unwrap();

        let used = catalog.mark_redemption_used(org, record.id).await.unwrap();
        assert_eq!(used.status, RedemptionStatus::Used);
        assert!(used.used_at.is_some());
        assert!(matches!(
            catalog.mark_redemption_used(org, record.id).await,
            Err(LoyaltyError::InvalidTransition(_))
        ));

        let stats = catalog.redemption_stats(org, Utc::now()).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.used, 1);
        assert_eq!(stats.total_points_spent, 40);

        let history = catalog.redemptions_for_customer(org, record.customer_id, 50).await.unwrap();
        assert_eq!(history.len(), 1);
    }
}
