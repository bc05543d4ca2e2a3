// Path: crates/api/src/services.rs
//! Traits for the external collaborators of the watcher core.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use telewatch_types::error::ServiceError;
use telewatch_types::{ActiveSessions, AlertMessage, Session};

/// The durable session catalog.
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    /// Loads every session. Called once at startup; a failure is fatal.
    async fn load_all_sessions(&self) -> Result<Vec<Session>, ServiceError>;
}

/// Retrieval of the keys needed to talk to the activity service.
#[async_trait]
pub trait SecretProvider: Send + Sync + Debug {
    /// The API key sent as `X-Api-Key` on every activity service call.
    async fn api_key(&self) -> Result<String, ServiceError>;
    /// The caller key that unlocks pre-signed transactions server-side.
    async fn caller_key(&self) -> Result<String, ServiceError>;
}

/// The activity REST service. Every call is a single attempt.
#[async_trait]
pub trait ActivityService: Send + Sync + Debug {
    /// Reports which of `sessions` is the live association, with account and nonce.
    async fn whos_active(&self, sessions: &[String]) -> Result<ActiveSessions, ServiceError>;

    /// Reports the current on-chain nonce of each account.
    async fn account_nonces(
        &self,
        accounts: &[String],
    ) -> Result<HashMap<String, u64>, ServiceError>;

    /// Submits a pre-signed reassociation transaction.
    ///
    /// An error does not prove the transaction was not applied; the chain is the
    /// source of truth and callers confirm through [`ActivityService::whos_active`].
    async fn request_association(&self, tx: &str, caller_key: &str)
        -> Result<(), ServiceError>;
}

/// Outbound delivery of operator alerts.
#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    /// Delivers one message. Failures are logged by the caller and never retried.
    async fn send(&self, message: &AlertMessage) -> Result<(), ServiceError>;
}
