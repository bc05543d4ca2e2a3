// Path: crates/types/src/config/mod.rs

//! Configuration for the telewatch daemon (`telewatch.toml`).
//!
//! Loaded once at startup, validated, and shared read-only afterwards.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Telemetry feed connection.
    pub telemetry: TelemetryFeedConfig,
    /// Lag thresholds.
    pub thresholds: ThresholdConfig,
    /// Monitoring cadence.
    pub monitor: MonitorConfig,
    /// Confirmation polling after a reassociation request.
    #[serde(default)]
    pub failover: FailoverConfig,
    /// Activity service endpoints.
    pub rest: RestConfig,
    /// Alert routing.
    pub alerts: AlertConfig,
    /// Session catalog location.
    pub sessions: SessionStoreConfig,
    /// Where API and caller keys come from.
    pub secrets: SecretsConfig,
    /// Listen address of the metrics/health HTTP server.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

/// Telemetry feed connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryFeedConfig {
    /// Feed host (and optional port), e.g. `telemetry.example.org:8000`.
    pub host: String,
    /// Chain identifier sent in the `subscribe:<id>` handshake.
    pub telemetry_id: String,
    /// URL scheme of the feed endpoint.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Fixed delay between reconnect attempts.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Reconnect attempts before giving up. Large enough to be effectively unbounded.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Capacity of the raw frame queue between the socket reader and the decoder.
    #[serde(default = "default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,
}

impl TelemetryFeedConfig {
    /// The websocket endpoint, `<scheme>://<host>/feed`.
    pub fn endpoint(&self) -> String {
        format!("{}://{}/feed", self.scheme, self.host.trim_end_matches('/'))
    }

    /// The subscribe handshake sent right after connecting.
    pub fn subscribe_command(&self) -> String {
        format!("subscribe:{}", self.telemetry_id)
    }

    /// Delay between reconnect attempts.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Block-height distances beyond which a session counts as lagging its group.
///
/// Comparisons are strict: a session exactly `threshold` blocks behind is in sync.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThresholdConfig {
    /// Imported-height lag that triggers notification and failover.
    pub imported_reassociate: u64,
    /// Finalized-height lag that triggers notification and failover.
    pub finalized_reassociate: u64,
    /// Loaded but not consulted; lag notification uses the reassociate thresholds.
    #[serde(default)]
    pub imported_notify: u64,
    /// Loaded but not consulted; lag notification uses the reassociate thresholds.
    #[serde(default)]
    pub finalized_notify: u64,
}

/// Monitoring loop cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between two monitoring cycles of the same group.
    pub block_check_period_secs: u64,
    /// Minimum interval between two lag notifications for the same group.
    pub alert_chill_period_minutes: u64,
    /// Delay before the first cycle, so the feed can report initial heights.
    #[serde(default = "default_startup_grace_secs")]
    pub startup_grace_secs: u64,
    /// Interval of the node-count status log line.
    #[serde(default = "default_status_report_secs")]
    pub status_report_secs: u64,
}

impl MonitorConfig {
    /// Delay between monitoring cycles.
    pub fn block_check_period(&self) -> Duration {
        Duration::from_secs(self.block_check_period_secs)
    }

    /// Notification chill period.
    pub fn alert_chill_period(&self) -> Duration {
        Duration::from_secs(self.alert_chill_period_minutes.saturating_mul(60))
    }

    /// Delay before the first cycle.
    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }
}

/// Confirmation polling after a reassociation request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailoverConfig {
    /// Number of activity polls before giving up on a candidate.
    #[serde(default = "default_confirm_attempts")]
    pub confirm_attempts: u32,
    /// Fixed delay before each poll.
    #[serde(default = "default_confirm_delay_secs")]
    pub confirm_delay_secs: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            confirm_attempts: default_confirm_attempts(),
            confirm_delay_secs: default_confirm_delay_secs(),
        }
    }
}

impl FailoverConfig {
    /// Delay before each confirmation poll.
    pub fn confirm_delay(&self) -> Duration {
        Duration::from_secs(self.confirm_delay_secs)
    }
}

/// Activity service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// `POST` endpoint answering which sessions are active and account nonces.
    pub whos_active_url: String,
    /// `POST` endpoint submitting a pre-signed reassociation transaction.
    pub request_association_url: String,
    /// Client-level timeout applied to every call.
    #[serde(default = "default_rest_timeout_secs")]
    pub timeout_secs: u64,
}

/// Alert routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Subject line of every alert.
    #[serde(default = "default_alert_subject")]
    pub subject: String,
    /// Email recipient.
    #[serde(default)]
    pub email_to: Option<String>,
    /// SMS recipient.
    #[serde(default)]
    pub sms_to: Option<String>,
    /// Delivery endpoint. Alerts go to the log only when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Capacity of the alert queue. A full queue blocks producers.
    #[serde(default = "default_alert_queue_capacity")]
    pub queue_capacity: usize,
    /// Minimum gap between two deliveries.
    #[serde(default = "default_min_delivery_gap_secs")]
    pub min_delivery_gap_secs: u64,
}

impl AlertConfig {
    /// Minimum gap between two deliveries.
    pub fn min_delivery_gap(&self) -> Duration {
        Duration::from_secs(self.min_delivery_gap_secs)
    }
}

/// Session catalog location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStoreConfig {
    /// JSON file holding an array of sessions.
    pub path: PathBuf,
}

/// Source of the activity service API key and the caller key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum SecretsConfig {
    /// Read both keys from environment variables on every call.
    Env {
        /// Variable holding the API key.
        #[serde(default = "default_api_key_var")]
        api_key_var: String,
        /// Variable holding the caller key.
        #[serde(default = "default_caller_key_var")]
        caller_key_var: String,
    },
    /// Read both keys from a JSON file on every call.
    File {
        /// Path of a JSON object with `api_key` and `caller_key`.
        path: PathBuf,
    },
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9617".to_string()
}
fn default_scheme() -> String {
    "ws".to_string()
}
fn default_reconnect_delay_secs() -> u64 {
    3
}
fn default_max_reconnect_attempts() -> u32 {
    1_000_000
}
fn default_frame_queue_capacity() -> usize {
    10_000
}
fn default_startup_grace_secs() -> u64 {
    30
}
fn default_status_report_secs() -> u64 {
    60
}
fn default_confirm_attempts() -> u32 {
    6
}
fn default_confirm_delay_secs() -> u64 {
    15
}
fn default_rest_timeout_secs() -> u64 {
    30
}
fn default_alert_subject() -> String {
    "TELEWATCH ALERT".to_string()
}
fn default_alert_queue_capacity() -> usize {
    100
}
fn default_min_delivery_gap_secs() -> u64 {
    2
}
fn default_api_key_var() -> String {
    "TELEWATCH_API_KEY".to_string()
}
fn default_caller_key_var() -> String {
    "TELEWATCH_CALLER_KEY".to_string()
}

impl WatchConfig {
    /// Reads, parses and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates a configuration document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the watcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn non_empty(field: &'static str, value: &str) -> Result<(), ConfigError> {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be empty".into(),
                });
            }
            Ok(())
        }
        fn non_zero(field: &'static str, value: u64) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
            Ok(())
        }

        non_empty("telemetry.host", &self.telemetry.host)?;
        non_empty("telemetry.telemetry_id", &self.telemetry.telemetry_id)?;
        non_empty("rest.whos_active_url", &self.rest.whos_active_url)?;
        non_empty(
            "rest.request_association_url",
            &self.rest.request_association_url,
        )?;
        non_zero(
            "monitor.block_check_period_secs",
            self.monitor.block_check_period_secs,
        )?;
        non_zero(
            "monitor.status_report_secs",
            self.monitor.status_report_secs,
        )?;
        non_zero("rest.timeout_secs", self.rest.timeout_secs)?;
        non_zero(
            "failover.confirm_attempts",
            u64::from(self.failover.confirm_attempts),
        )?;
        non_zero(
            "telemetry.max_reconnect_attempts",
            u64::from(self.telemetry.max_reconnect_attempts),
        )?;
        if self.telemetry.frame_queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "telemetry.frame_queue_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        if self.alerts.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "alerts.queue_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        let has_recipient = self.alerts.email_to.as_deref().is_some_and(|s| !s.is_empty())
            || self.alerts.sms_to.as_deref().is_some_and(|s| !s.is_empty());
        if !has_recipient {
            return Err(ConfigError::Invalid {
                field: "alerts",
                reason: "at least one of email_to or sms_to is required".into(),
            });
        }
        Ok(())
    }
}
