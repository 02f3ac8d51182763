use crate::error::{OmnilyError, OmnilyResult};
use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `OMNILY__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub loyalty: LoyaltyConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "pos-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            loyalty: LoyaltyConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

// ─── Loyalty Config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LoyaltyConfig {
    /// Points per currency unit when an organization has no rate configured.
    #[serde(default = "default_points_per_unit")]
    pub default_points_per_unit: f64,
    /// Read tier-upgrade notifications older than this are deleted.
    #[serde(default = "default_notification_retention_days")]
    pub notification_retention_days: i64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Use conditional store updates for points and stock instead of
    /// read-compute-write. Off by default to keep the historical behavior.
    #[serde(default)]
    pub atomic_redemption: bool,
    #[serde(default = "default_redemption_history_limit")]
    pub redemption_history_limit: usize,
}

fn default_points_per_unit() -> f64 { 1.0 }
fn default_notification_retention_days() -> i64 { 7 }
fn default_cleanup_interval_secs() -> u64 { 3600 }
fn default_redemption_history_limit() -> usize { 50 }

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            default_points_per_unit: default_points_per_unit(),
            notification_retention_days: default_notification_retention_days(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            atomic_redemption: false,
            redemption_history_limit: default_redemption_history_limit(),
        }
    }
}

// ─── Email Config ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    /// URL of the send-email function.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_email_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_email_timeout_ms() -> u64 { 5000 }

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: None,
            timeout_ms: default_email_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("OMNILY")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Reject combinations the services cannot start with.
    pub fn validate(&self) -> OmnilyResult<()> {
        if self.email.enabled && self.email.endpoint.trim().is_empty() {
            return Err(OmnilyError::Config(
                "email.enabled requires email.endpoint".to_string(),
            ));
        }
        if self.loyalty.default_points_per_unit < 0.0 {
            return Err(OmnilyError::Config(
                "loyalty.default_points_per_unit must be non-negative".to_string(),
            ));
        }
        if self.loyalty.notification_retention_days < 0 {
            return Err(OmnilyError::Config(
                "loyalty.notification_retention_days must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.http_port, 8080);
        assert_eq!(config.loyalty.notification_retention_days, 7);
        assert!(!config.loyalty.atomic_redemption);
        assert!(!config.email.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_email_requires_endpoint() {
        let mut config = AppConfig::default();
        config.email.enabled = true;
        assert!(matches!(config.validate(), Err(OmnilyError::Config(_))));
        config.email.endpoint = "https://example.test/functions/v1/send-email".into();
        assert!(config.validate().is_ok());
    }
}
