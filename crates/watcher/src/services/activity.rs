// Path: crates/watcher/src/services/activity.rs
use super::snippet;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use telewatch_api::{ActivityService, SecretProvider};
use telewatch_types::config::RestConfig;
use telewatch_types::error::ServiceError;
use telewatch_types::ActiveSessions;

const API_KEY_HEADER: &str = "X-Api-Key";

/// JSON-over-HTTP client for the activity service.
///
/// Every call is a single `POST` authenticated with the `X-Api-Key` header. The API
/// key is fetched from the [`SecretProvider`] per call so rotations apply without a
/// restart.
#[derive(Debug, Clone)]
pub struct HttpActivityService {
    client: Client,
    whos_active_url: String,
    request_association_url: String,
    secrets: Arc<dyn SecretProvider>,
}

impl HttpActivityService {
    /// Builds a client for the endpoints in `config`.
    pub fn new(config: &RestConfig, secrets: Arc<dyn SecretProvider>) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Transport {
                endpoint: config.whos_active_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            whos_active_url: config.whos_active_url.clone(),
            request_association_url: config.request_association_url.clone(),
            secrets,
        })
    }

    async fn post(&self, url: &str, body: &impl Serialize) -> Result<reqwest::Response, ServiceError> {
        let api_key = self.secrets.api_key().await?;
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport {
                endpoint: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body: snippet(&body),
            });
        }
        Ok(response)
    }

    async fn post_json<R: DeserializeOwned>(&self, url: &str, body: &impl Serialize) -> Result<R, ServiceError> {
        self.post(url, body)
            .await?
            .json::<R>()
            .await
            .map_err(|e| ServiceError::Decode(format!("{url}: {e}")))
    }
}

#[async_trait]
impl ActivityService for HttpActivityService {
    async fn whos_active(&self, sessions: &[String]) -> Result<ActiveSessions, ServiceError> {
        self.post_json(&self.whos_active_url, &json!({ "sessions": sessions }))
            .await
    }

    async fn account_nonces(&self, accounts: &[String]) -> Result<HashMap<String, u64>, ServiceError> {
        self.post_json(&self.whos_active_url, &json!({ "accounts": accounts }))
            .await
    }

    async fn request_association(&self, tx: &str, caller_key: &str) -> Result<(), ServiceError> {
        self.post(
            &self.request_association_url,
            &json!({ "tx": tx, "keyCaller": caller_key }),
        )
        .await
        .map(|_| ())
    }
}
