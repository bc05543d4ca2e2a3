// Path: crates/types/src/session.rs
//! Sessions, their pre-signed reassociation transactions, and activity records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A node's validator association record as stored in the session catalog.
///
/// The catalog fields are loaded once at startup. `stopped` and `not_synced` are
/// local bookkeeping owned by the group monitor and are never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique, human-readable node name. Matches the name the node reports to telemetry.
    pub node_name: String,
    /// The replication group this session backs up.
    pub group_name: String,
    /// Encrypted session key, also the key of the session's activity record.
    pub session: String,
    /// Failover ordering key.
    ///
    /// The catalog documents this as "higher priority gets activated first", but
    /// failover hands over to the *lowest* priority that is still strictly above the
    /// lagging session's own. See DESIGN.md for the open product question.
    pub priority: i64,
    /// JSON bundle of encrypted pre-signed reassociation transactions, see [`TransactionBundle`].
    #[serde(default)]
    pub transactions: String,
    /// Proxy account that signs reassociation transactions on behalf of the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Set once this session has been failed away from. A stopped session is never a
    /// failover source or target again for the lifetime of the process.
    #[serde(skip)]
    pub stopped: bool,
    /// Set when the session lagged its group in the most recent monitoring cycle.
    #[serde(skip)]
    pub not_synced: bool,
}

impl Session {
    /// Creates a catalog session with empty transaction bundle and no proxy.
    pub fn new(
        node_name: impl Into<String>,
        group_name: impl Into<String>,
        session: impl Into<String>,
        priority: i64,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            group_name: group_name.into(),
            session: session.into(),
            priority,
            transactions: String::new(),
            proxy: None,
            stopped: false,
            not_synced: false,
        }
    }

    /// Decodes the session's transaction bundle.
    pub fn transaction_bundle(&self) -> Result<TransactionBundle, serde_json::Error> {
        TransactionBundle::decode(&self.transactions)
    }
}

/// Pre-signed transactions for one target node, valid for consecutive nonces.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionSeries {
    /// Encrypted signed transactions. Entry `i` is valid exactly for nonce `nonce + i`.
    pub txs: Vec<String>,
    /// Nonce of the first entry.
    pub nonce: u64,
}

impl TransactionSeries {
    /// Returns the transaction valid for `nonce`, if the series covers it.
    pub fn for_nonce(&self, nonce: u64) -> Option<&str> {
        let index = nonce.checked_sub(self.nonce)?;
        let index = usize::try_from(index).ok()?;
        self.txs.get(index).map(String::as_str)
    }
}

/// Mapping from target node name to the series of transactions that reassociate the
/// owning session to that node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TransactionBundle(BTreeMap<String, TransactionSeries>);

impl TransactionBundle {
    /// Parses the JSON form stored in [`Session::transactions`].
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Serializes the bundle back into its stored JSON form.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Adds or replaces the series for `target`.
    pub fn insert(&mut self, target: impl Into<String>, series: TransactionSeries) {
        self.0.insert(target.into(), series);
    }

    /// Finds the transaction that reassociates to `target` at `nonce`.
    ///
    /// `None` is not an error: it means no pre-signed transaction covers this nonce
    /// yet and the offline signer has to be run again.
    pub fn transaction_for(&self, target: &str, nonce: u64) -> Option<&str> {
        self.0.get(target).and_then(|series| series.for_nonce(nonce))
    }

    /// Returns true if the bundle holds no series at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Ephemeral on-chain truth about one session, as reported by the activity service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveSessionRecord {
    /// Whether the session is currently the live association.
    #[serde(default)]
    pub active: bool,
    /// Public address of the associated account, present only when active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Current nonce of `account`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
}

/// Activity records keyed by session key. Re-fetched whenever fresh truth is needed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ActiveSessions(HashMap<String, ActiveSessionRecord>);

impl ActiveSessions {
    /// Returns the record for `session`, if the service reported one.
    pub fn get(&self, session: &str) -> Option<&ActiveSessionRecord> {
        self.0.get(session)
    }

    /// Returns true if `session` is reported as the live association.
    pub fn is_active(&self, session: &str) -> bool {
        self.0.get(session).is_some_and(|record| record.active)
    }

    /// Inserts or replaces a record.
    pub fn insert(&mut self, session: impl Into<String>, record: ActiveSessionRecord) {
        self.0.insert(session.into(), record);
    }
}

impl FromIterator<(String, ActiveSessionRecord)> for ActiveSessions {
    fn from_iter<I: IntoIterator<Item = (String, ActiveSessionRecord)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
