//! API server: the loyalty REST router plus the Prometheus exporter.

use crate::loyalty_rest;
use crate::rest::{self, AppState};
use crate::rewards_rest;
use axum::routing::{get, post, put};
use axum::Router;
use omnily_core::config::AppConfig;
use omnily_loyalty::LoyaltyEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    engine: Arc<LoyaltyEngine>,
}

impl ApiServer {
    pub fn new(config: AppConfig, engine: Arc<LoyaltyEngine>) -> Self {
        Self { config, engine }
    }

    /// Builds the full REST router with middleware.
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        let customer = "/v1/organizations/:org/customers/:customer";
        let rewards = "/v1/organizations/:org/rewards";

        Router::new()
            // Counter screen
            .route(customer, get(loyalty_rest::handle_open_customer))
            .route(&format!("{customer}/sales"), post(loyalty_rest::handle_record_sale))
            .route(&format!("{customer}/sales/preview"), post(loyalty_rest::handle_preview_sale))
            .route(&format!("{customer}/points/adjust"), post(loyalty_rest::handle_adjust_points))
            .route(
                &format!("{customer}/notifications/clear"),
                post(loyalty_rest::handle_clear_notifications),
            )
            .route(
                &format!("{customer}/redemptions"),
                get(loyalty_rest::handle_customer_redemptions),
            )
            // Redemptions
            .route("/v1/organizations/:org/redemptions", post(loyalty_rest::handle_redeem))
            .route(
                "/v1/organizations/:org/redemptions/stats",
                get(loyalty_rest::handle_redemption_stats),
            )
            .route(
                "/v1/organizations/:org/redemptions/:id/use",
                post(loyalty_rest::handle_mark_used),
            )
            // Reward catalog
            .route(
                rewards,
                get(rewards_rest::handle_list_rewards).post(rewards_rest::handle_create_reward),
            )
            .route(&format!("{rewards}/active"), get(rewards_rest::handle_active_rewards))
            .route(&format!("{rewards}/available"), get(rewards_rest::handle_available_rewards))
            .route(&format!("{rewards}/stats"), get(rewards_rest::handle_reward_stats))
            .route(
                &format!("{rewards}/:id"),
                put(rewards_rest::handle_update_reward).delete(rewards_rest::handle_delete_reward),
            )
            .route(&format!("{rewards}/:id/toggle"), post(rewards_rest::handle_toggle_reward))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            .fallback(loyalty_rest::handle_not_found)
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the Prometheus exporter on its own port.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
