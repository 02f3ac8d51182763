//! Loyalty program domain types: tier ladder, reward catalog entries,
//! redemption records, and tier-change notifications.
//!
//! Tiers are configured per organization as a ladder of point thresholds.
//! When an organization has no ladder configured, the fixed four-step
//! fallback (Bronze → Silver → Gold → Platinum) applies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Tier Ladder ────────────────────────────────────────────────────────────

/// One rung of an organization's loyalty ladder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierDefinition {
    /// Unique within the ladder.
    pub name: String,
    /// Points balance at which the tier starts to apply.
    pub threshold: u64,
    /// Earn-rate multiplier applied to sales while in this tier.
    pub multiplier: f64,
    /// Display color (CSS hex).
    pub color: String,
}

impl TierDefinition {
    pub fn new(
        name: impl Into<String>,
        threshold: u64,
        multiplier: f64,
        color: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            threshold,
            multiplier,
            color: color.into(),
        }
    }
}

/// Ladder used when an organization has not configured its own tiers.
pub fn fallback_ladder() -> Vec<TierDefinition> {
    vec![
        TierDefinition::new("Bronze", 0, 1.0, "#a3a3a3"),
        TierDefinition::new("Silver", 200, 1.2, "#64748b"),
        TierDefinition::new("Gold", 500, 1.5, "#f59e0b"),
        TierDefinition::new("Platinum", 1000, 2.0, "#e5e7eb"),
    ]
}

/// Sales category carrying an extra earn multiplier (e.g. "Coffee beans" at 2x).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BonusCategory {
    pub category: String,
    pub multiplier: f64,
}

// ─── Rewards ────────────────────────────────────────────────────────────────

/// What a reward gives the customer. Serialized as `{"type": ..., "value": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum RewardKind {
    /// Percentage off the next purchase.
    Discount(f64),
    /// A named free item.
    FreeProduct(String),
    /// Currency credited back.
    Cashback(f64),
    /// Gift card of a fixed currency value.
    GiftCard(f64),
}

impl RewardKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            RewardKind::Discount(_) => "discount",
            RewardKind::FreeProduct(_) => "freeProduct",
            RewardKind::Cashback(_) => "cashback",
            RewardKind::GiftCard(_) => "giftCard",
        }
    }

    /// Flattened value as stored on a redemption snapshot.
    pub fn value_label(&self) -> String {
        match self {
            RewardKind::Discount(v) | RewardKind::Cashback(v) | RewardKind::GiftCard(v) => {
                v.to_string()
            }
            RewardKind::FreeProduct(item) => item.clone(),
        }
    }
}

/// A reward in an organization's catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reward {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub kind: RewardKind,
    pub description: String,
    /// Always positive.
    pub points_required: u64,
    /// Name of the minimum tier, looked up in the organization's ladder.
    pub required_tier: Option<String>,
    /// `None` means unlimited stock.
    pub stock_quantity: Option<u32>,
    pub is_active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub terms_conditions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reward {
    pub fn tracks_stock(&self) -> bool {
        self.stock_quantity.is_some()
    }

    pub fn in_stock(&self) -> bool {
        self.stock_quantity.map(|q| q > 0).unwrap_or(true)
    }

    /// Whether `now` falls inside the validity window. Both bounds are inclusive.
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        let started = self.valid_from.map(|from| now >= from).unwrap_or(true);
        let not_ended = self.valid_until.map(|until| now <= until).unwrap_or(true);
        started && not_ended
    }
}

// ─── Redemptions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    Redeemed,
    /// Set by the counter-side QR scan once the reward has been handed over.
    Used,
    Expired,
    Cancelled,
}

/// Immutable record of one successful redemption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedemptionRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub reward_id: Uuid,
    pub reward_name: String,
    pub reward_type: String,
    pub reward_value: String,
    pub points_spent: u64,
    pub customer_points_before: u64,
    pub customer_points_after: u64,
    pub customer_tier: Option<String>,
    pub status: RedemptionStatus,
    pub redeemed_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

// ─── Tier-change notifications ──────────────────────────────────────────────

pub const TIER_UPGRADE_CATEGORY: &str = "tier_upgrade";

/// Celebration row written when a customer moves up the ladder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierChangeNotification {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub category: String,
    pub title: String,
    pub message: String,
    pub old_tier_name: String,
    pub new_tier_name: String,
    pub new_tier_color: String,
    pub new_tier_multiplier: f64,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reward() -> Reward {
        let now = Utc::now();
        Reward {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "Free espresso".into(),
            kind: RewardKind::FreeProduct("Espresso".into()),
            description: String::new(),
            points_required: 100,
            required_tier: None,
            stock_quantity: None,
            is_active: true,
            valid_from: None,
            valid_until: None,
            terms_conditions: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_fallback_ladder_thresholds() {
        let ladder = fallback_ladder();
        let thresholds: Vec<u64> = ladder.iter().map(|t| t.threshold).collect();
        assert_eq!(thresholds, vec![0, 200, 500, 1000]);
        assert_eq!(ladder[3].name, "Platinum");
        assert_eq!(ladder[2].multiplier, 1.5);
    }

    #[test]
    fn test_reward_kind_wire_format() {
        let json = serde_json::to_value(RewardKind::GiftCard(25.0)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "giftCard", "value": 25.0}));
        let kind: RewardKind =
            serde_json::from_value(serde_json::json!({"type": "freeProduct", "value": "Croissant"}))
                .unwrap();
        assert_eq!(kind.type_name(), "freeProduct");
        assert_eq!(kind.value_label(), "Croissant");
    }

    #[test]
    fn test_stock_and_window() {
        let mut r = reward();
        assert!(r.in_stock());
        assert!(!r.tracks_stock());
        r.stock_quantity = Some(0);
        assert!(!r.in_stock());

        let now = Utc::now();
        r.valid_from = Some(now + Duration::days(1));
        assert!(!r.window_contains(now));
        r.valid_from = Some(now);
        r.valid_until = Some(now);
        assert!(r.window_contains(now));
        assert!(!r.window_contains(now + Duration::seconds(1)));
    }
}
