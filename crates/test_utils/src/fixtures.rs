//! Builders for sessions, transaction bundles, activity snapshots and config.

use telewatch_types::config::AlertConfig;
use telewatch_types::session::TransactionSeries;
use telewatch_types::{ActiveSessionRecord, ActiveSessions, Session, TransactionBundle};

/// A catalog session whose session key is `<name>-session`.
pub fn session(name: &str, group: &str, priority: i64) -> Session {
    Session::new(name, group, format!("{name}-session"), priority)
}

/// Activity snapshot in which exactly `sessions` are active.
pub fn active(sessions: &[&str]) -> ActiveSessions {
    sessions
        .iter()
        .map(|s| {
            (
                s.to_string(),
                ActiveSessionRecord {
                    active: true,
                    account: None,
                    nonce: None,
                },
            )
        })
        .collect()
}

/// Fluent builder for the stored JSON form of a [`TransactionBundle`].
#[derive(Debug, Default)]
pub struct BundleBuilder {
    bundle: TransactionBundle,
}

/// Starts an empty bundle.
pub fn bundle() -> BundleBuilder {
    BundleBuilder::default()
}

impl BundleBuilder {
    /// Adds transactions to `target` valid from `first_nonce` onwards.
    pub fn series(mut self, target: &str, first_nonce: u64, txs: &[&str]) -> Self {
        self.bundle.insert(
            target,
            TransactionSeries {
                txs: txs.iter().map(|t| t.to_string()).collect(),
                nonce: first_nonce,
            },
        );
        self
    }

    /// Encodes the bundle into the string stored on a session.
    pub fn encode(self) -> String {
        self.bundle.encode().unwrap_or_default()
    }
}

/// Alert routing with both an email and an SMS recipient.
pub fn alert_config() -> AlertConfig {
    AlertConfig {
        subject: "TELEWATCH ALERT".into(),
        email_to: Some("ops@example.org".into()),
        sms_to: Some("+15550100".into()),
        webhook_url: None,
        queue_capacity: 100,
        min_delivery_gap_secs: 2,
    }
}

/// A telemetry frame from alternating `command, payload` values.
pub fn frame(records: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&records).unwrap_or_default()
}
