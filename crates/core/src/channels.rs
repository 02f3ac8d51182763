//! Outbound email types and the dispatch seam.
//!
//! Sends are template-based: the caller names a template and hands over a
//! flat map of variables; rendering happens on the provider side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

pub const TIER_UPGRADE_TEMPLATE: &str = "tier_upgrade";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailRequest {
    pub template: String,
    pub organization_id: Uuid,
    pub to_email: String,
    pub to_name: String,
    pub variables: BTreeMap<String, String>,
}

impl EmailRequest {
    pub fn new(
        template: impl Into<String>,
        organization_id: Uuid,
        to_email: impl Into<String>,
        to_name: impl Into<String>,
    ) -> Self {
        Self {
            template: template.into(),
            organization_id,
            to_email: to_email.into(),
            to_name: to_name.into(),
            variables: BTreeMap::new(),
        }
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailReceipt {
    pub provider_message_id: Option<String>,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("email transport error: {0}")]
    Transport(String),

    #[error("email provider rejected message: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send(&self, request: EmailRequest) -> Result<EmailReceipt, EmailError>;
}

/// Records every request; can be switched to fail for error-path tests.
#[derive(Default)]
pub struct CaptureMailer {
    sent: Mutex<Vec<EmailRequest>>,
    fail: Mutex<bool>,
}

impl CaptureMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn sent(&self) -> Vec<EmailRequest> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl EmailDispatcher for CaptureMailer {
    async fn send(&self, request: EmailRequest) -> Result<EmailReceipt, EmailError> {
        if *self.fail.lock() {
            return Err(EmailError::Transport("capture mailer set to fail".to_string()));
        }
        self.sent.lock().push(request);
        Ok(EmailReceipt {
            provider_message_id: Some(format!("capture-{}", Uuid::new_v4())),
            accepted_at: Utc::now(),
        })
    }
}
