// Path: crates/watcher/src/services/secrets.rs
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use telewatch_api::SecretProvider;
use telewatch_types::config::SecretsConfig;
use telewatch_types::error::ServiceError;

/// Reads both keys from environment variables at call time.
#[derive(Debug, Clone)]
pub struct EnvSecretProvider {
    api_key_var: String,
    caller_key_var: String,
}

impl EnvSecretProvider {
    /// Creates a provider reading the two named variables.
    pub fn new(api_key_var: impl Into<String>, caller_key_var: impl Into<String>) -> Self {
        Self {
            api_key_var: api_key_var.into(),
            caller_key_var: caller_key_var.into(),
        }
    }

    fn read(var: &str) -> Result<String, ServiceError> {
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(ServiceError::SecretUnavailable(format!(
                "environment variable {var} is not set"
            ))),
        }
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn api_key(&self) -> Result<String, ServiceError> {
        Self::read(&self.api_key_var)
    }

    async fn caller_key(&self) -> Result<String, ServiceError> {
        Self::read(&self.caller_key_var)
    }
}

#[derive(Deserialize)]
struct SecretFile {
    api_key: String,
    caller_key: String,
}

/// Reads both keys from a JSON file at call time.
#[derive(Debug, Clone)]
pub struct FileSecretProvider {
    path: PathBuf,
}

impl FileSecretProvider {
    /// Creates a provider reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<SecretFile, ServiceError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ServiceError::SecretUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ServiceError::SecretUnavailable(format!("{}: {e}", self.path.display()))
        })
    }
}

#[async_trait]
impl SecretProvider for FileSecretProvider {
    async fn api_key(&self) -> Result<String, ServiceError> {
        Ok(self.load().await?.api_key)
    }

    async fn caller_key(&self) -> Result<String, ServiceError> {
        Ok(self.load().await?.caller_key)
    }
}

/// Builds the provider selected in configuration.
pub fn secrets_from_config(config: &SecretsConfig) -> Arc<dyn SecretProvider> {
    match config {
        SecretsConfig::Env {
            api_key_var,
            caller_key_var,
        } => Arc::new(EnvSecretProvider::new(api_key_var, caller_key_var)),
        SecretsConfig::File { path } => Arc::new(FileSecretProvider::new(path)),
    }
}
