//! Loyalty event bus: publish-and-forget notifications for the
//! presentation layer (customer displays, celebration screens, dashboards).
//!
//! Workflows accept an `Arc<dyn EventSink>` and publish into it; they never
//! wait on or depend on a subscriber.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Something a presentation layer may want to react to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoyaltyEvent {
    /// Staff opened a customer record.
    CustomerSelected {
        organization_id: Uuid,
        customer_id: Uuid,
        at: DateTime<Utc>,
    },
    /// Points a pending sale would earn, shown before confirmation.
    SalePreview {
        organization_id: Uuid,
        customer_id: Uuid,
        amount: f64,
        points: u64,
        at: DateTime<Utc>,
    },
    /// A sale was recorded and points credited.
    SaleCelebration {
        organization_id: Uuid,
        customer_id: Uuid,
        points_earned: u64,
        new_balance: u64,
        at: DateTime<Utc>,
    },
    PointsRedeemed {
        organization_id: Uuid,
        customer_id: Uuid,
        redemption_id: Uuid,
        points_spent: u64,
        new_balance: u64,
        at: DateTime<Utc>,
    },
    TierChanged {
        organization_id: Uuid,
        customer_id: Uuid,
        old_tier: String,
        new_tier: String,
        upgrade: bool,
        at: DateTime<Utc>,
    },
    /// Points were deducted but the redemption did not complete.
    RedemptionPartialFailure {
        organization_id: Uuid,
        customer_id: Uuid,
        reward_id: Uuid,
        step: String,
        at: DateTime<Utc>,
    },
}

impl LoyaltyEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LoyaltyEvent::CustomerSelected { .. } => "customer_selected",
            LoyaltyEvent::SalePreview { .. } => "sale_preview",
            LoyaltyEvent::SaleCelebration { .. } => "sale_celebration",
            LoyaltyEvent::PointsRedeemed { .. } => "points_redeemed",
            LoyaltyEvent::TierChanged { .. } => "tier_changed",
            LoyaltyEvent::RedemptionPartialFailure { .. } => "redemption_partial_failure",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: LoyaltyEvent);
}

/// No-op sink for deployments without a display subscriber.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn publish(&self, _event: LoyaltyEvent) {}
}

/// Writes each event to the log; the default for headless deployments.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: LoyaltyEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => {
                tracing::debug!(kind = event.kind(), payload = %payload, "Loyalty event")
            }
            Err(e) => {
                tracing::warn!(kind = event.kind(), error = %e, "Loyalty event not serializable")
            }
        }
    }
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<LoyaltyEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LoyaltyEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn publish(&self, event: LoyaltyEvent) {
        self.events.lock().push(event);
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        let org = Uuid::new_v4();
        let customer = Uuid::new_v4();
        sink.publish(LoyaltyEvent::CustomerSelected {
            organization_id: org,
            customer_id: customer,
            at: Utc::now(),
        });
        sink.publish(LoyaltyEvent::SalePreview {
            organization_id: org,
            customer_id: customer,
            amount: 12.5,
            points: 12,
            at: Utc::now(),
        });

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_kind("sale_preview"), 1);
        sink.clear();
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_event_tagging() {
        let event = LoyaltyEvent::TierChanged {
            organization_id: Uuid::nil(),
            customer_id: Uuid::nil(),
            old_tier: "Bronze".into(),
            new_tier: "Silver".into(),
            upgrade: true,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "tier_changed");
        assert_eq!(json["new_tier"], "Silver");
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        sink.publish(LoyaltyEvent::CustomerSelected {
            organization_id: Uuid::nil(),
            customer_id: Uuid::nil(),
            at: Utc::now(),
        });
    }
}
