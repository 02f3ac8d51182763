//! End-to-end loyalty flows against the in-memory store: sale, tier change,
//! redemption, and the counter-screen celebration.

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use omnily_core::channels::CaptureMailer;
    use omnily_core::config::LoyaltyConfig;
    use omnily_core::event_bus::{capture_sink, CaptureSink};
    use omnily_core::loyalty::{RedemptionStatus, Reward, RewardKind};
    use omnily_core::types::{Customer, Organization};
    use omnily_loyalty::{
        InMemoryStore, LoyaltyEngine, LoyaltyStore, RedeemRequest, RedemptionError, RewardInput,
        SaleRequest,
    };
    use std::sync::Arc;
    use uuid::Uuid;

    struct Counter {
        store: Arc<InMemoryStore>,
        mailer: Arc<CaptureMailer>,
        events: Arc<CaptureSink>,
        engine: LoyaltyEngine,
        org: Organization,
    }

    fn counter(config: LoyaltyConfig) -> Counter {
        let store = Arc::new(InMemoryStore::new());
        let mailer = Arc::new(CaptureMailer::new());
        let events = capture_sink();
        let org = Organization {
            id: Uuid::new_v4(),
            name: "Panificio Rossi".into(),
            points_per_unit: 1.0,
            points_name: "Punti".into(),
            loyalty_tiers: Vec::new(),
            bonus_categories: Vec::new(),
        };
        store.insert_organization(org.clone());
        let engine = LoyaltyEngine::new(store.clone(), mailer.clone(), events.clone(), &config);
        Counter {
            store,
            mailer,
            events,
            engine,
            org,
        }
    }

    fn enroll(c: &Counter, name: &str, points: u64) -> Customer {
        let email = format!("{}@example.com", name.to_lowercase());
        let mut customer = Customer::new(c.org.id, name, Some(email));
        customer.points = points;
        c.store.insert_customer(customer.clone());
        customer
    }

    fn reward_input(points: u64, stock: Option<u32>, tier: Option<&str>) -> RewardInput {
        RewardInput {
            name: "Torta della nonna".into(),
            kind: RewardKind::FreeProduct("Torta".into()),
            description: "One slice".into(),
            points_required: points,
            required_tier: tier.map(String::from),
            stock_quantity: stock,
            is_active: true,
            valid_from: None,
            valid_until: None,
            terms_conditions: None,
        }
    }

    fn redeem_request(
        c: &Counter,
        customer: &Customer,
        reward: &Reward,
        points: u64,
    ) -> RedeemRequest {
        RedeemRequest {
            organization_id: c.org.id,
            customer_id: customer.id,
            reward_id: reward.id,
            customer_points: points,
            customer_tier: None,
        }
    }

    async fn balance(c: &Counter, customer: &Customer) -> u64 {
        c.store
            .get_customer(c.org.id, customer.id)
            .await
            .unwrap()
            .unwrap()
            .points
    }

    #[tokio::test]
    async fn last_unit_of_stock_goes_to_first_redeemer() {
        let c = counter(LoyaltyConfig::default());
        let reward = c
            .engine
            .catalog()
            .create(c.org.id, reward_input(100, Some(1), None))
            .await
            .unwrap();
        let first = enroll(&c, "Ada", 120);
        let second = enroll(&c, "Grace", 500);

        let outcome = c
            .engine
            .redeem(&redeem_request(&c, &first, &reward, 120))
            .await
            .unwrap();
        assert_eq!(outcome.record.customer_points_before, 120);
        assert_eq!(outcome.record.customer_points_after, 20);
        assert_eq!(outcome.record.status, RedemptionStatus::Redeemed);
        assert_eq!(balance(&c, &first).await, 20);

        let stored = c.engine.catalog().get(c.org.id, reward.id).await.unwrap();
        assert_eq!(stored.stock_quantity, Some(0));

        let err = c
            .engine
            .redeem(&redeem_request(&c, &second, &reward, 500))
            .await
            .unwrap_err();
        assert!(matches!(err, RedemptionError::OutOfStock(_)));
        assert_eq!(balance(&c, &second).await, 500);
    }

    #[tokio::test]
    async fn silver_customer_cannot_take_gold_reward() {
        let c = counter(LoyaltyConfig::default());
        let reward = c
            .engine
            .catalog()
            .create(c.org.id, reward_input(50, None, Some("Gold")))
            .await
            .unwrap();
        let customer = enroll(&c, "Ada", 300);

        let err = c
            .engine
            .redeem(&redeem_request(&c, &customer, &reward, 300))
            .await
            .unwrap_err();
        assert!(matches!(err, RedemptionError::TierTooLow { .. }));
        assert!(err.is_validation());
        assert_eq!(balance(&c, &customer).await, 300);
        assert_eq!(c.store.redemption_count(), 0);
    }

    #[tokio::test]
    async fn repeated_redeem_deducts_twice() {
        let c = counter(LoyaltyConfig::default());
        let reward = c
            .engine
            .catalog()
            .create(c.org.id, reward_input(50, None, None))
            .await
            .unwrap();
        let customer = enroll(&c, "Ada", 300);
        let request = redeem_request(&c, &customer, &reward, 300);

        c.engine.redeem(&request).await.unwrap();
        c.engine.redeem(&request).await.unwrap();

        // Both calls start from the balance the screen showed.
        assert_eq!(balance(&c, &customer).await, 250);
        assert_eq!(c.store.redemption_count(), 2);
    }

    #[tokio::test]
    async fn atomic_mode_deducts_from_stored_balance() {
        let config = LoyaltyConfig {
            atomic_redemption: true,
            ..LoyaltyConfig::default()
        };
        let c = counter(config);
        let reward = c
            .engine
            .catalog()
            .create(c.org.id, reward_input(50, None, None))
            .await
            .unwrap();
        let customer = enroll(&c, "Ada", 300);
        let request = redeem_request(&c, &customer, &reward, 300);

        c.engine.redeem(&request).await.unwrap();
        let second = c.engine.redeem(&request).await.unwrap();

        assert_eq!(second.record.customer_points_before, 250);
        assert_eq!(balance(&c, &customer).await, 200);
    }

    #[tokio::test]
    async fn sale_upgrade_then_counter_celebration() {
        let c = counter(LoyaltyConfig::default());
        let customer = enroll(&c, "Ada", 150);

        let outcome = c
            .engine
            .record_sale(&SaleRequest {
                organization_id: c.org.id,
                customer_id: customer.id,
                amount: 100.0,
                category: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.new_balance, 250);
        let change = outcome.tier_change.unwrap();
        assert!(change.is_upgrade);
        assert_eq!(change.old_tier.name, "Bronze");
        assert_eq!(change.new_tier.name, "Silver");

        let sent = c.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to_email, "ada@example.com");
        assert_eq!(sent[0].variables["organization_name"], "Panificio Rossi");

        let view = c.engine.open_customer(c.org.id, customer.id).await.unwrap();
        assert_eq!(view.customer.tier, "Silver");
        let pending = view.pending_notification.unwrap();
        assert_eq!(pending.new_tier_color, "#64748b");

        c.engine.clear_notifications(c.org.id, customer.id).await.unwrap();
        assert_eq!(c.events.count_kind("sale_celebration"), 1);
        assert_eq!(c.events.count_kind("customer_selected"), 1);
    }

    #[tokio::test]
    async fn redemption_demotes_without_celebration() {
        let c = counter(LoyaltyConfig::default());
        let reward = c
            .engine
            .catalog()
            .create(c.org.id, reward_input(100, None, None))
            .await
            .unwrap();
        let customer = enroll(&c, "Ada", 250);

        let outcome = c
            .engine
            .redeem(&redeem_request(&c, &customer, &reward, 250))
            .await
            .unwrap();
        let change = outcome.tier_change.unwrap();
        assert!(change.tier_changed);
        assert!(!change.is_upgrade);
        assert_eq!(change.new_tier.name, "Bronze");
        assert_eq!(c.mailer.count(), 0);
        assert_eq!(c.store.notification_count(), 0);

        let stored = c.store.get_customer(c.org.id, customer.id).await.unwrap().unwrap();
        assert_eq!(stored.tier, "Bronze");
    }

    #[tokio::test]
    async fn counter_scan_marks_redemption_used() {
        let c = counter(LoyaltyConfig::default());
        let reward = c
            .engine
            .catalog()
            .create(c.org.id, reward_input(100, None, None))
            .await
            .unwrap();
        let customer = enroll(&c, "Ada", 120);
        let outcome = c
            .engine
            .redeem(&redeem_request(&c, &customer, &reward, 120))
            .await
            .unwrap();

        let used = c
            .engine
            .catalog()
            .mark_redemption_used(c.org.id, outcome.record.id)
            .await
            .unwrap();
        assert_eq!(used.status, RedemptionStatus::Used);

        let history = c.engine.redemption_history(c.org.id, customer.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, RedemptionStatus::Used);

        let stats = c.engine.catalog().redemption_stats(c.org.id, Utc::now()).await.unwrap();
        assert_eq!(stats.used, 1);
        assert_eq!(stats.redeemed, 0);
    }
}
