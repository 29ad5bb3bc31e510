//! Webhook dispatcher. Posts user messages to the remote processor.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{MessageSink, iso_millis};
use crate::config::ChatConfig;
use crate::error::{ConfigError, DispatchError};
use crate::session::UserContext;

/// A user message ready to leave the client.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub session_id: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub user: Option<UserContext>,
}

/// JSON body posted to the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPayload {
    pub message: String,
    pub timestamp: String,
    pub session_id: String,
    pub source: String,
    pub tech_id: Option<String>,
    pub first_name: String,
    pub job_title: String,
    pub beta_code_id: String,
}

impl DispatchPayload {
    pub fn new(outbound: &OutboundMessage, user: &UserContext, source: &str) -> Self {
        Self {
            message: outbound.text.clone(),
            timestamp: iso_millis(outbound.sent_at),
            session_id: outbound.session_id.clone(),
            source: source.to_string(),
            tech_id: user.tech_id.clone(),
            first_name: user.first_name.clone(),
            job_title: user.job_title.clone(),
            beta_code_id: user.user_code.clone(),
        }
    }
}

/// Result of a dispatch that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The webhook accepted the message.
    Delivered { latency: Duration },
    /// No webhook configured; nothing was sent.
    Skipped,
}

/// Posts messages to the configured webhook over HTTP.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    webhook_url: Option<SecretString>,
    source_tag: String,
}

impl WebhookDispatcher {
    pub fn new(config: &ChatConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            webhook_url: config.webhook_url.clone(),
            source_tag: config.source_tag.clone(),
        })
    }
}

#[async_trait]
impl MessageSink for WebhookDispatcher {
    fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, outbound: &OutboundMessage) -> Result<DispatchOutcome, DispatchError> {
        let Some(url) = self.webhook_url.as_ref() else {
            warn!("Webhook URL is not configured, skipping message dispatch");
            return Ok(DispatchOutcome::Skipped);
        };

        let Some(user) = outbound.user.as_ref() else {
            warn!(session_id = %outbound.session_id, "No user context available for dispatch");
            return Err(DispatchError::Unauthenticated);
        };

        let payload = DispatchPayload::new(outbound, user, &self.source_tag);
        let started = Instant::now();

        let resp = self
            .client
            .post(url.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?;

        let latency = started.elapsed();
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(
                session_id = %outbound.session_id,
                status = status.as_u16(),
                latency_secs = latency.as_secs_f64(),
                "Webhook rejected message"
            );
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            session_id = %outbound.session_id,
            first_name = %user.first_name,
            latency_secs = latency.as_secs_f64(),
            "User message dispatched"
        );

        Ok(DispatchOutcome::Delivered { latency })
    }
}
