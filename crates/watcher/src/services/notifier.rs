// Path: crates/watcher/src/services/notifier.rs
use super::snippet;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use telewatch_api::Notifier;
use telewatch_types::config::AlertConfig;
use telewatch_types::error::ServiceError;
use telewatch_types::AlertMessage;

fn require_recipient(message: &AlertMessage) -> Result<(), ServiceError> {
    if message.has_recipient() {
        Ok(())
    } else {
        Err(ServiceError::Rejected(
            "alert has neither an email address nor a phone number".into(),
        ))
    }
}

/// Writes alerts to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), ServiceError> {
        require_recipient(message)?;
        if let Some(email) = &message.email {
            tracing::info!(target: "alerts", subject = %message.subject, to = %email.to, body = %email.html, "Email alert");
        }
        if let Some(sms) = &message.sms {
            tracing::info!(target: "alerts", subject = %message.subject, to = %sms.to, body = %sms.text, "SMS alert");
        }
        Ok(())
    }
}

/// Posts each alert as JSON to a delivery gateway that fans out to email and SMS.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    /// Creates a notifier posting to `url`.
    pub fn new(url: impl Into<String>) -> Result<Self, ServiceError> {
        let url = url.into();
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::Transport {
                endpoint: url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), ServiceError> {
        require_recipient(message)?;
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| ServiceError::Transport {
                endpoint: self.url.clone(),
                reason: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                endpoint: self.url.clone(),
                status: status.as_u16(),
                body: snippet(&body),
            });
        }
        Ok(())
    }
}

/// Builds the notifier selected in configuration.
pub fn notifier_from_config(config: &AlertConfig) -> Result<Arc<dyn Notifier>, ServiceError> {
    Ok(match config.webhook_url.as_deref() {
        Some(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(url)?),
        _ => Arc::new(LogNotifier),
    })
}
