//! Fakes for the activity service, secret storage and session catalog.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use telewatch_api::{ActivityService, SecretProvider, SessionStore};
use telewatch_types::error::ServiceError;
use telewatch_types::{ActiveSessionRecord, ActiveSessions, Session};

#[derive(Debug, Default)]
struct ChainModel {
    active: ActiveSessions,
    nonces: HashMap<String, u64>,
    activate_on_submit: HashMap<String, String>,
    submissions: Vec<(String, String)>,
    whos_active_calls: usize,
    fail_whos_active: bool,
    fail_submissions: bool,
}

/// An activity service backed by a tiny in-memory model of the chain.
///
/// Submitting a transaction registered with [`FakeActivityService::activate_on_submit`]
/// makes its session active, even when the submit call is scripted to fail.
#[derive(Debug, Default)]
pub struct FakeActivityService {
    model: Mutex<ChainModel>,
}

impl FakeActivityService {
    /// Creates a service where nothing is active.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the active set.
    pub fn set_active(&self, sessions: &[&str]) {
        let mut model = self.model.lock();
        model.active = ActiveSessions::default();
        for session in sessions {
            model.active.insert(
                *session,
                ActiveSessionRecord {
                    active: true,
                    account: None,
                    nonce: None,
                },
            );
        }
    }

    /// Sets the on-chain nonce of `account`.
    pub fn set_nonce(&self, account: &str, nonce: u64) {
        self.model.lock().nonces.insert(account.to_string(), nonce);
    }

    /// Makes `session` active once `tx` is submitted.
    pub fn activate_on_submit(&self, tx: &str, session: &str) {
        self.model
            .lock()
            .activate_on_submit
            .insert(tx.to_string(), session.to_string());
    }

    /// Makes `whos_active` fail.
    pub fn fail_whos_active(&self, fail: bool) {
        self.model.lock().fail_whos_active = fail;
    }

    /// Makes `request_association` report failure.
    pub fn fail_submissions(&self, fail: bool) {
        self.model.lock().fail_submissions = fail;
    }

    /// Submitted `(tx, caller_key)` pairs, in order.
    pub fn submissions(&self) -> Vec<(String, String)> {
        self.model.lock().submissions.clone()
    }

    /// Number of `whos_active` calls so far.
    pub fn whos_active_calls(&self) -> usize {
        self.model.lock().whos_active_calls
    }
}

fn unavailable(what: &str) -> ServiceError {
    ServiceError::Transport {
        endpoint: format!("fake://{what}"),
        reason: "scripted failure".into(),
    }
}

#[async_trait]
impl ActivityService for FakeActivityService {
    async fn whos_active(&self, sessions: &[String]) -> Result<ActiveSessions, ServiceError> {
        let mut model = self.model.lock();
        model.whos_active_calls += 1;
        if model.fail_whos_active {
            return Err(unavailable("whos_active"));
        }
        Ok(sessions
            .iter()
            .filter_map(|s| model.active.get(s).map(|r| (s.clone(), r.clone())))
            .collect())
    }

    async fn account_nonces(
        &self,
        accounts: &[String],
    ) -> Result<HashMap<String, u64>, ServiceError> {
        let model = self.model.lock();
        Ok(accounts
            .iter()
            .filter_map(|a| model.nonces.get(a).map(|n| (a.clone(), *n)))
            .collect())
    }

    async fn request_association(&self, tx: &str, caller_key: &str) -> Result<(), ServiceError> {
        let mut model = self.model.lock();
        model
            .submissions
            .push((tx.to_string(), caller_key.to_string()));
        if let Some(session) = model.activate_on_submit.get(tx).cloned() {
            model.active.insert(
                session,
                ActiveSessionRecord {
                    active: true,
                    account: None,
                    nonce: None,
                },
            );
        }
        if model.fail_submissions {
            return Err(unavailable("request_association"));
        }
        Ok(())
    }
}

/// Fixed secrets.
#[derive(Debug, Clone)]
pub struct StaticSecrets {
    api_key: String,
    caller_key: String,
}

impl StaticSecrets {
    /// Creates a provider returning the given keys.
    pub fn new(api_key: &str, caller_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            caller_key: caller_key.to_string(),
        }
    }
}

#[async_trait]
impl SecretProvider for StaticSecrets {
    async fn api_key(&self) -> Result<String, ServiceError> {
        Ok(self.api_key.clone())
    }

    async fn caller_key(&self) -> Result<String, ServiceError> {
        Ok(self.caller_key.clone())
    }
}

/// A session catalog held in memory.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Vec<Session>,
    fail: bool,
}

impl InMemorySessionStore {
    /// Creates a store holding `sessions`.
    pub fn new(sessions: Vec<Session>) -> Self {
        Self {
            sessions,
            fail: false,
        }
    }

    /// Creates a store whose load always fails.
    pub fn failing() -> Self {
        Self {
            sessions: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load_all_sessions(&self) -> Result<Vec<Session>, ServiceError> {
        if self.fail {
            return Err(ServiceError::Store("scripted failure".into()));
        }
        Ok(self.sessions.clone())
    }
}
