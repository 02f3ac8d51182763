use crate::loyalty::{fallback_ladder, BonusCategory, TierDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A merchant running a loyalty program.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    /// Points credited per currency unit spent, before multipliers.
    pub points_per_unit: f64,
    /// Display name for points ("Stars", "Punti", ...).
    pub points_name: String,
    #[serde(default)]
    pub loyalty_tiers: Vec<TierDefinition>,
    #[serde(default)]
    pub bonus_categories: Vec<BonusCategory>,
}

impl Organization {
    /// The configured ladder, or the fallback when none is configured.
    pub fn effective_ladder(&self) -> Vec<TierDefinition> {
        if self.loyalty_tiers.is_empty() {
            fallback_ladder()
        } else {
            self.loyalty_tiers.clone()
        }
    }

    /// Bonus multiplier for a sales category; 1.0 when the category has none.
    pub fn category_multiplier(&self, category: Option<&str>) -> f64 {
        category
            .and_then(|name| self.bonus_categories.iter().find(|c| c.category == name))
            .map(|c| c.multiplier)
            .unwrap_or(1.0)
    }
}

/// A loyalty member belonging to one organization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub points: u64,
    pub total_spent: f64,
    pub visits: u32,
    /// Cached name of the tier resolved from `points`.
    pub tier: String,
    pub is_active: bool,
    pub member_since: DateTime<Utc>,
    pub last_visit: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(organization_id: Uuid, name: impl Into<String>, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            email,
            points: 0,
            total_spent: 0.0,
            visits: 0,
            tier: "Bronze".to_string(),
            is_active: true,
            member_since: now,
            last_visit: None,
            updated_at: now,
        }
    }
}
