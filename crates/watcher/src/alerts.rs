// Path: crates/watcher/src/alerts.rs
//! Operator alerting.
//!
//! Producers (group monitors, the failover executor) enqueue through an
//! [`AlertSender`]; a single [`AlertDispatcher`] task drains the bounded queue in
//! order and paces deliveries. A full queue blocks producers rather than dropping.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use telewatch_api::Notifier;
use telewatch_telemetry::{error_metrics, metrics};
use telewatch_types::config::AlertConfig;
use telewatch_types::error::ErrorCode;
use telewatch_types::AlertMessage;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

#[derive(Debug)]
struct AlertRoute {
    subject: String,
    email_to: Option<String>,
    sms_to: Option<String>,
}

impl AlertRoute {
    /// One message per configured channel.
    fn messages(&self, text: &str) -> Vec<AlertMessage> {
        let mut out = Vec::with_capacity(2);
        if let Some(to) = self.email_to.as_deref().filter(|to| !to.is_empty()) {
            out.push(AlertMessage::email(&self.subject, to, text));
        }
        if let Some(to) = self.sms_to.as_deref().filter(|to| !to.is_empty()) {
            out.push(AlertMessage::sms(&self.subject, to, text));
        }
        out
    }
}

/// Producer handle for the alert queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AlertSender {
    queue: mpsc::Sender<AlertMessage>,
    route: Arc<AlertRoute>,
}

impl AlertSender {
    /// Enqueues `text` once per configured channel (email, SMS).
    ///
    /// Waits while the queue is full.
    pub async fn notify(&self, text: &str) {
        let messages = self.route.messages(text);
        if messages.is_empty() {
            tracing::warn!(target: "alerts", text, "No alert recipient configured, alert not queued");
            return;
        }
        tracing::info!(target: "alerts", text, "Queueing alert");
        for message in messages {
            if self.queue.send(message).await.is_err() {
                tracing::warn!(target: "alerts", text, "Alert queue closed, alert dropped");
                metrics().inc_alerts("dropped");
                return;
            }
        }
    }
}

/// Creates the bounded alert queue for `config`.
pub fn alert_channel(config: &AlertConfig) -> (AlertSender, mpsc::Receiver<AlertMessage>) {
    let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
    let route = Arc::new(AlertRoute {
        subject: config.subject.clone(),
        email_to: config.email_to.clone(),
        sms_to: config.sms_to.clone(),
    });
    (AlertSender { queue, route }, rx)
}

/// Drains the alert queue into a [`Notifier`].
#[derive(Debug)]
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    min_gap: Duration,
}

impl AlertDispatcher {
    /// Creates a dispatcher pausing `min_gap` after every delivery attempt.
    pub fn new(notifier: Arc<dyn Notifier>, min_gap: Duration) -> Self {
        Self { notifier, min_gap }
    }

    async fn deliver(&self, message: &AlertMessage) {
        match self.notifier.send(message).await {
            Ok(()) => {
                metrics().inc_alerts("delivered");
                tracing::debug!(target: "alerts", subject = %message.subject, "Alert delivered");
            }
            Err(e) => {
                metrics().inc_alerts("failed");
                error_metrics().inc_error("alerts", e.code());
                tracing::error!(target: "alerts", subject = %message.subject, error = %e, "Alert delivery failed");
            }
        }
    }

    /// Delivers queued messages in order until the queue closes or shutdown.
    pub async fn run(self, mut queue: mpsc::Receiver<AlertMessage>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(target: "alerts", "Alert dispatcher started");
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() { break; }
                }
                message = queue.recv() => {
                    let Some(message) = message else { break };
                    self.deliver(&message).await;
                    tokio::select! {
                        _ = tokio::time::sleep(self.min_gap) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() { break; }
                        }
                    }
                }
            }
        }
        tracing::info!(target: "alerts", "Alert dispatcher stopped");
    }
}

/// Last lag-notification time per group, shared by all group monitors.
#[derive(Debug, Default)]
pub struct NotificationLedger {
    last: RwLock<HashMap<String, Instant>>,
}

impl NotificationLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `group` was never notified or its last notification is at
    /// least `chill` old.
    pub fn is_due(&self, group: &str, chill: Duration) -> bool {
        let now = Instant::now();
        self.last
            .read()
            .get(group)
            .map_or(true, |at| now.saturating_duration_since(*at) >= chill)
    }

    /// Records that `group` was notified now.
    pub fn stamp(&self, group: &str) {
        self.last.write().insert(group.to_string(), Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telewatch_test_utils::notifier::RecordingNotifier;

    fn config(email: Option<&str>, sms: Option<&str>) -> AlertConfig {
        AlertConfig {
            subject: "TELEWATCH ALERT".into(),
            email_to: email.map(str::to_string),
            sms_to: sms.map(str::to_string),
            webhook_url: None,
            queue_capacity: 100,
            min_delivery_gap_secs: 2,
        }
    }

    #[tokio::test]
    async fn test_notify_fans_out_per_channel() {
        let (sender, mut rx) = alert_channel(&config(Some("ops@example.org"), Some("+15550100")));
        sender.notify("Check g1").await;

        let email = rx.recv().await.unwrap();
        let sms = rx.recv().await.unwrap();
        assert_eq!(email.email.unwrap().html, "<p>Check g1</p>");
        assert_eq!(sms.sms.unwrap().text, "Check g1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notify_skips_unconfigured_channel() {
        let (sender, mut rx) = alert_channel(&config(None, Some("+15550100")));
        sender.notify("Check g1").await;
        assert!(rx.recv().await.unwrap().email.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_keeps_order_gap_and_survives_failures() {
        let notifier = Arc::new(RecordingNotifier::new());
        notifier.fail_first(1);
        let (sender, rx) = alert_channel(&config(Some("ops@example.org"), None));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(
            AlertDispatcher::new(notifier.clone(), Duration::from_secs(2)).run(rx, shutdown_rx),
        );

        sender.notify("first").await;
        sender.notify("second").await;
        sender.notify("third").await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let bodies: Vec<String> = notifier
            .delivered()
            .into_iter()
            .filter_map(|m| m.email.map(|e| e.html))
            .collect();
        assert_eq!(bodies, vec!["<p>second</p>", "<p>third</p>"]);
        assert_eq!(notifier.attempts(), 3);

        let times = notifier.attempt_times();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(2));
        }

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_blocks_producer() {
        let mut cfg = config(Some("ops@example.org"), None);
        cfg.queue_capacity = 1;
        let (sender, mut rx) = alert_channel(&cfg);
        sender.notify("one").await;

        let blocked = tokio::time::timeout(Duration::from_secs(5), sender.notify("two")).await;
        assert!(blocked.is_err());

        rx.recv().await.unwrap();
        sender.notify("three").await;
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_respects_chill_period() {
        let ledger = NotificationLedger::new();
        let chill = Duration::from_secs(600);
        assert!(ledger.is_due("g1", chill));
        ledger.stamp("g1");
        assert!(!ledger.is_due("g1", chill));
        assert!(ledger.is_due("g2", chill));

        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(!ledger.is_due("g1", chill));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(ledger.is_due("g1", chill));
    }
}
