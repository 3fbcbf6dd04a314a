//! Outbound delivery to a user through the chat gateway.
//!
//! The service only ever sends two kinds of unsolicited messages: the
//! session-start notice and the idle warning. Both go through `Notifier`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::GatewayConfig;

/// Outcome of a delivery attempt the gateway answered definitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The user cannot be reached (unknown user, DMs closed, bot blocked).
    Unreachable,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway error ({code}): {message}")]
    Gateway { code: u16, message: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to `owner` over their private channel.
    async fn notify(&self, owner: &str, text: &str) -> Result<Delivery, NotifyError>;
}

#[derive(Debug, Serialize)]
struct NotifyPayload<'a> {
    owner: &'a str,
    text: &'a str,
}

/// Posts `{owner, text}` to the gateway's notify webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(config: &GatewayConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            url: config.notify_url.clone(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, owner: &str, text: &str) -> Result<Delivery, NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&NotifyPayload { owner, text })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(Delivery::Delivered);
        }

        match status {
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::GONE => {
                tracing::debug!(owner = owner, status = status.as_u16(), "Owner unreachable");
                Ok(Delivery::Unreachable)
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(NotifyError::Gateway {
                    code: status.as_u16(),
                    message,
                })
            }
        }
    }
}

/// Writes each message to the log instead of a gateway. Used when no
/// `notify_url` is configured, e.g. when driving sessions from the CLI.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, owner: &str, text: &str) -> Result<Delivery, NotifyError> {
        tracing::info!(owner = owner, text = text, "Notice (no gateway configured)");
        Ok(Delivery::Delivered)
    }
}

/// Webhook notifier for a configured `notify_url`, log notifier otherwise.
pub fn notifier_from_config(config: &GatewayConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    if config.notify_url.trim().is_empty() {
        tracing::warn!("gateway.notify_url is empty; notices are only logged");
        return Ok(Arc::new(LogNotifier));
    }
    Ok(Arc::new(WebhookNotifier::new(config)?))
}
