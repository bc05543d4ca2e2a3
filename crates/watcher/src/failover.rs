// Path: crates/watcher/src/failover.rs
//! Reassociation of a lagging active session to a healthy backup node.
//!
//! The executor walks eligible candidates in ascending priority order. For each
//! one it looks up the pre-signed transaction valid for the proxy account's
//! current nonce, submits it, and polls the activity service until the candidate
//! shows up as active or the poll budget runs out. The first confirmed candidate
//! wins; the lagging session is then marked stopped for good.

use crate::alerts::AlertSender;
use std::sync::Arc;
use telewatch_api::{ActivityService, SecretProvider};
use telewatch_telemetry::{error_metrics, metrics};
use telewatch_types::config::FailoverConfig;
use telewatch_types::error::{ErrorCode, FailoverError};
use telewatch_types::session::TransactionBundle;
use telewatch_types::{ActiveSessions, Session};

/// A confirmed handover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// Node name of the session that was lagging.
    pub from: String,
    /// Node name of the session that is now active.
    pub to: String,
}

/// Why a single candidate was passed over.
#[derive(Debug)]
enum Skip {
    NoAccount,
    Nonce(String),
    NoTransaction { nonce: u64 },
    Unconfirmed { polls: u32 },
}

impl std::fmt::Display for Skip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAccount => write!(f, "no proxy or active account to read a nonce from"),
            Self::Nonce(reason) => write!(f, "nonce unavailable: {reason}"),
            Self::NoTransaction { nonce } => {
                write!(f, "no pre-signed transaction for nonce {nonce}")
            }
            Self::Unconfirmed { polls } => write!(f, "not active after {polls} polls"),
        }
    }
}

/// Returns true if `candidate` may take over from `lagging`.
///
/// The candidate must be in sync, not already active, not itself stopped, and
/// rank strictly after the lagging session, which must not be stopped.
pub fn is_eligible(lagging: &Session, candidate: &Session, active: &ActiveSessions) -> bool {
    !candidate.not_synced
        && !candidate.stopped
        && !active.is_active(&candidate.session)
        && candidate.priority > lagging.priority
        && !lagging.stopped
}

/// Drives one reassociation attempt at a time for a group monitor.
#[derive(Debug, Clone)]
pub struct FailoverExecutor {
    activity: Arc<dyn ActivityService>,
    secrets: Arc<dyn SecretProvider>,
    alerts: AlertSender,
    policy: FailoverConfig,
}

impl FailoverExecutor {
    /// Creates an executor.
    pub fn new(
        activity: Arc<dyn ActivityService>,
        secrets: Arc<dyn SecretProvider>,
        alerts: AlertSender,
        policy: FailoverConfig,
    ) -> Self {
        Self {
            activity,
            secrets,
            alerts,
            policy,
        }
    }

    /// Fails `sessions[lagging]` over to the first eligible session that confirms.
    ///
    /// `sessions` must already be in ascending priority order and `active` must be
    /// the activity snapshot of the current cycle.
    pub async fn execute(
        &self,
        sessions: &mut [Session],
        lagging: usize,
        active: &ActiveSessions,
    ) -> Result<Activation, FailoverError> {
        let Some(source) = sessions.get(lagging).cloned() else {
            return Err(FailoverError::NoCandidate {
                node: String::new(),
                attempted: 0,
            });
        };
        let no_candidate = |attempted| FailoverError::NoCandidate {
            node: source.node_name.clone(),
            attempted,
        };

        let bundle = match source.transaction_bundle() {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!(target: "failover", node = %source.node_name, error = %e, "Transaction bundle is not decodable");
                metrics().inc_failover("no_candidate");
                return Err(no_candidate(0));
            }
        };

        let candidates: Vec<(String, String)> = sessions
            .iter()
            .filter(|candidate| is_eligible(&source, candidate, active))
            .map(|candidate| (candidate.node_name.clone(), candidate.session.clone()))
            .collect();
        let watched: Vec<String> = sessions.iter().map(|s| s.session.clone()).collect();

        let mut attempted = 0;
        for (target_node, target_session) in candidates {
            attempted += 1;
            match self
                .try_candidate(&source, &bundle, active, &target_node, &target_session, &watched)
                .await
            {
                Ok(()) => {
                    if let Some(session) = sessions.get_mut(lagging) {
                        session.stopped = true;
                    }
                    tracing::info!(target: "failover", from = %source.node_name, to = %target_node, "Reassociation confirmed");
                    metrics().inc_failover("confirmed");
                    self.alerts
                        .notify(&format!(
                            "Completed reassociation from {} to {}",
                            source.node_name, target_node
                        ))
                        .await;
                    return Ok(Activation {
                        from: source.node_name.clone(),
                        to: target_node,
                    });
                }
                Err(skip) => {
                    tracing::warn!(target: "failover", from = %source.node_name, to = %target_node, reason = %skip, "Candidate skipped");
                }
            }
        }

        let err = no_candidate(attempted);
        metrics().inc_failover("no_candidate");
        error_metrics().inc_error("failover", err.code());
        tracing::error!(target: "failover", error = %err, "Failover exhausted candidates");
        Err(err)
    }

    async fn current_nonce(&self, source: &Session, active: &ActiveSessions) -> Result<u64, Skip> {
        let account = source
            .proxy
            .clone()
            .or_else(|| active.get(&source.session).and_then(|r| r.account.clone()))
            .ok_or(Skip::NoAccount)?;
        let nonces = self
            .activity
            .account_nonces(std::slice::from_ref(&account))
            .await
            .map_err(|e| Skip::Nonce(e.to_string()))?;
        nonces
            .get(&account)
            .copied()
            .ok_or_else(|| Skip::Nonce(format!("account {account} missing from response")))
    }

    async fn submit(&self, tx: &str, source: &str, target: &str) {
        let caller_key = match self.secrets.caller_key().await {
            Ok(key) => key,
            Err(e) => {
                error_metrics().inc_error("failover", e.code());
                tracing::warn!(target: "failover", from = source, to = target, error = %e, "Caller key unavailable, polling anyway");
                return;
            }
        };
        // The chain is the source of truth; a failed submit may still have landed.
        if let Err(e) = self.activity.request_association(tx, &caller_key).await {
            error_metrics().inc_error("failover", e.code());
            tracing::warn!(target: "failover", from = source, to = target, error = %e, "Reassociation submit failed, polling anyway");
        }
    }

    async fn try_candidate(
        &self,
        source: &Session,
        bundle: &TransactionBundle,
        active: &ActiveSessions,
        target_node: &str,
        target_session: &str,
        watched: &[String],
    ) -> Result<(), Skip> {
        let nonce = self.current_nonce(source, active).await?;
        let tx = bundle
            .transaction_for(target_node, nonce)
            .ok_or(Skip::NoTransaction { nonce })?;

        tracing::info!(target: "failover", from = %source.node_name, to = target_node, nonce, "Requesting reassociation");
        self.submit(tx, &source.node_name, target_node).await;
        self.alerts
            .notify(&format!(
                "Requested reassociation from {} to {}",
                source.node_name, target_node
            ))
            .await;

        for poll in 1..=self.policy.confirm_attempts {
            tokio::time::sleep(self.policy.confirm_delay()).await;
            match self.activity.whos_active(watched).await {
                Ok(now) if now.is_active(target_session) => return Ok(()),
                Ok(_) => {
                    tracing::debug!(target: "failover", to = target_node, poll, "Candidate not active yet");
                }
                Err(e) => {
                    tracing::warn!(target: "failover", to = target_node, poll, error = %e, "Activity poll failed");
                }
            }
        }
        Err(Skip::Unconfirmed {
            polls: self.policy.confirm_attempts,
        })
    }
}
