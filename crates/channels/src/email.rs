//! Edge-function email delivery with per-template send statistics.
//!
//! The edge function owns template rendering and the SMTP provider; this side
//! only POSTs the template name, the recipient, and the dynamic variables.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use omnily_core::channels::{EmailDispatcher, EmailError, EmailReceipt, EmailRequest};
use omnily_core::config::EmailConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Send counters for one template.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TemplateStats {
    pub template: String,
    pub sent: u64,
    pub failed: u64,
}

#[derive(Debug, Deserialize)]
struct EdgeFunctionResponse {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// POSTs template sends to the hosted email function.
pub struct EdgeFunctionMailer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    stats: DashMap<String, TemplateStats>,
}

impl EdgeFunctionMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        if config.endpoint.is_empty() {
            return Err(EmailError::Transport("email endpoint not configured".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        info!(
            endpoint = %config.endpoint,
            timeout_ms = config.timeout_ms,
            "Edge function mailer initialized"
        );
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            stats: DashMap::new(),
        })
    }

    pub fn template_stats(&self, template: &str) -> Option<TemplateStats> {
        self.stats.get(template).map(|s| s.clone())
    }

    fn record(&self, template: &str, ok: bool) {
        let mut entry = self
            .stats
            .entry(template.to_string())
            .or_insert_with(|| TemplateStats {
                template: template.to_string(),
                ..Default::default()
            });
        if ok {
            entry.sent += 1;
        } else {
            entry.failed += 1;
        }
        let name = if ok { "email.sent" } else { "email.failed" };
        metrics::counter!(name, "template" => template.to_string()).increment(1);
    }

    async fn post(&self, request: &EmailRequest) -> Result<EmailReceipt, EmailError> {
        let payload = serde_json::json!({
            "automation_type": request.template,
            "organization_id": request.organization_id,
            "to": {
                "email": request.to_email,
                "name": request.to_name,
            },
            "dynamic_data": request.variables,
        });

        let mut call = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;
        let status = response.status();
        let body: Option<EdgeFunctionResponse> = response.json().await.ok();

        if !status.is_success() {
            let reason = body
                .and_then(|b| b.error)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(EmailError::Rejected(reason));
        }

        Ok(EmailReceipt {
            provider_message_id: body.and_then(|b| b.message_id),
            accepted_at: Utc::now(),
        })
    }
}

#[async_trait]
impl EmailDispatcher for EdgeFunctionMailer {
    async fn send(&self, request: EmailRequest) -> Result<EmailReceipt, EmailError> {
        debug!(
            template = %request.template,
            to = %request.to_email,
            organization_id = %request.organization_id,
            "Sending email via edge function"
        );
        let result = self.post(&request).await;
        self.record(&request.template, result.is_ok());
        if let Err(e) = &result {
            warn!(template = %request.template, error = %e, "Edge function email failed");
        }
        result
    }
}

/// Logs the send and reports success. Used when email is switched off.
#[derive(Debug, Default)]
pub struct LogOnlyMailer;

#[async_trait]
impl EmailDispatcher for LogOnlyMailer {
    async fn send(&self, request: EmailRequest) -> Result<EmailReceipt, EmailError> {
        info!(
            template = %request.template,
            to = %request.to_email,
            variables = request.variables.len(),
            "Email disabled, logged only"
        );
        metrics::counter!("email.logged_only").increment(1);
        Ok(EmailReceipt {
            provider_message_id: None,
            accepted_at: Utc::now(),
        })
    }
}

/// Picks the mailer for the configuration: edge function when enabled,
/// log-only otherwise.
pub fn mailer_from_config(config: &EmailConfig) -> Result<Arc<dyn EmailDispatcher>, EmailError> {
    if config.enabled {
        Ok(Arc::new(EdgeFunctionMailer::new(config)?))
    } else {
        Ok(Arc::new(LogOnlyMailer))
    }
}
