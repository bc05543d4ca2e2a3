// Path: crates/watcher/src/monitor.rs
//! Per-group lag detection.
//!
//! One [`GroupMonitor`] task runs per replication group and exclusively owns that
//! group's sessions. Each cycle compares every member against the group's best
//! heights, fails over active sessions that lag, and raises a rate-limited
//! "Check <group>" alert.

use crate::alerts::{AlertSender, NotificationLedger};
use crate::chain_state::{ChainSnapshot, ChainStateStore};
use crate::failover::{Activation, FailoverExecutor};
use std::collections::BTreeMap;
use std::sync::Arc;
use telewatch_api::{ActivityService, SessionStore};
use telewatch_telemetry::{error_metrics, metrics, time::Timer};
use telewatch_types::config::{MonitorConfig, ThresholdConfig};
use telewatch_types::error::{ErrorCode, ServiceError};
use telewatch_types::{ActiveSessions, Session};
use tokio::sync::watch;

/// Splits the catalog into replication groups.
pub fn partition_groups(sessions: Vec<Session>) -> BTreeMap<String, Vec<Session>> {
    let mut groups: BTreeMap<String, Vec<Session>> = BTreeMap::new();
    for session in sessions {
        groups
            .entry(session.group_name.clone())
            .or_default()
            .push(session);
    }
    groups
}

/// Loads the session catalog and splits it into replication groups.
///
/// A failed load is fatal to startup.
pub async fn load_groups(
    store: &dyn SessionStore,
) -> Result<BTreeMap<String, Vec<Session>>, ServiceError> {
    let sessions = store.load_all_sessions().await?;
    let total = sessions.len();
    let groups = partition_groups(sessions);
    tracing::info!(target: "monitor", sessions = total, groups = groups.len(), "Session catalog loaded");
    Ok(groups)
}

/// Returns, per session, whether it lags the best member of its group by strictly
/// more than a reassociate threshold on either height.
pub fn lag_verdicts(
    sessions: &[Session],
    snapshot: &ChainSnapshot,
    thresholds: &ThresholdConfig,
) -> Vec<bool> {
    let best_imported = sessions
        .iter()
        .map(|s| snapshot.get(&s.node_name).imported)
        .max()
        .unwrap_or(0);
    let best_finalized = sessions
        .iter()
        .map(|s| snapshot.get(&s.node_name).finalized)
        .max()
        .unwrap_or(0);
    sessions
        .iter()
        .map(|s| {
            let heights = snapshot.get(&s.node_name);
            best_imported - heights.imported > thresholds.imported_reassociate
                || best_finalized - heights.finalized > thresholds.finalized_reassociate
        })
        .collect()
}

/// Shared collaborators of every group monitor.
#[derive(Debug, Clone)]
pub struct MonitorContext {
    /// Chain progress written by the decoder.
    pub store: Arc<ChainStateStore>,
    /// Activity service used for the per-cycle activity snapshot.
    pub activity: Arc<dyn ActivityService>,
    /// Failover driver.
    pub executor: FailoverExecutor,
    /// Alert queue.
    pub alerts: AlertSender,
    /// Per-group notification cadence.
    pub ledger: Arc<NotificationLedger>,
    /// Lag thresholds.
    pub thresholds: ThresholdConfig,
    /// Loop cadence.
    pub cadence: MonitorConfig,
}

/// What one cycle observed and did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Node names that lag the group.
    pub lagging: Vec<String>,
    /// Lagging node names that were also active.
    pub flagged: Vec<String>,
    /// Confirmed handovers.
    pub activations: Vec<Activation>,
    /// Whether a "Check <group>" alert was queued.
    pub notified: bool,
}

/// Watches a single replication group.
#[derive(Debug)]
pub struct GroupMonitor {
    group: String,
    sessions: Vec<Session>,
    ctx: MonitorContext,
}

impl GroupMonitor {
    /// Creates a monitor owning `sessions`.
    pub fn new(group: impl Into<String>, sessions: Vec<Session>, ctx: MonitorContext) -> Self {
        Self {
            group: group.into(),
            sessions,
            ctx,
        }
    }

    /// Sessions in their current order, with local flags.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    async fn fetch_active(&self) -> ActiveSessions {
        let keys: Vec<String> = self.sessions.iter().map(|s| s.session.clone()).collect();
        match self.ctx.activity.whos_active(&keys).await {
            Ok(active) => active,
            Err(e) => {
                error_metrics().inc_error("monitor", e.code());
                tracing::warn!(target: "monitor", group = %self.group, error = %e, "Activity lookup failed, assuming no session is active");
                ActiveSessions::default()
            }
        }
    }

    /// Runs one detection cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let _timer = Timer::new(metrics());
        let mut report = CycleReport::default();

        self.sessions.sort_by_key(|s| s.priority);
        let snapshot = self
            .ctx
            .store
            .snapshot(self.sessions.iter().map(|s| s.node_name.as_str()));
        let verdicts = lag_verdicts(&self.sessions, &snapshot, &self.ctx.thresholds);

        let mut lagging = Vec::new();
        for (idx, (session, lags)) in self.sessions.iter_mut().zip(verdicts).enumerate() {
            session.not_synced = lags;
            if lags {
                lagging.push(idx);
                report.lagging.push(session.node_name.clone());
            }
        }
        metrics().set_lagging_sessions(&self.group, lagging.len() as i64);
        if lagging.is_empty() {
            return report;
        }
        tracing::warn!(target: "monitor", group = %self.group, lagging = ?report.lagging, "Sessions lagging their group");

        let active = self.fetch_active().await;
        for idx in lagging {
            let Some(session) = self.sessions.get(idx) else {
                continue;
            };
            if !active.is_active(&session.session) {
                continue;
            }
            report.flagged.push(session.node_name.clone());
            tracing::warn!(target: "monitor", group = %self.group, node = %session.node_name, "Active session is lagging, starting failover");
            if let Ok(activation) = self.ctx.executor.execute(&mut self.sessions, idx, &active).await {
                report.activations.push(activation);
            }
        }

        if self
            .ctx
            .ledger
            .is_due(&self.group, self.ctx.cadence.alert_chill_period())
        {
            self.ctx.alerts.notify(&format!("Check {}", self.group)).await;
            self.ctx.ledger.stamp(&self.group);
            report.notified = true;
        }
        report
    }

    /// Runs cycles every block-check period, after the startup grace, until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(target: "monitor", group = %self.group, sessions = self.sessions.len(), "Group monitor started");
        tokio::select! {
            _ = tokio::time::sleep(self.ctx.cadence.startup_grace()) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() { return; }
            }
        }
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() { break; }
                }
                _ = tokio::time::sleep(self.ctx.cadence.block_check_period()) => {
                    self.run_cycle().await;
                }
            }
        }
        tracing::info!(target: "monitor", group = %self.group, "Group monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::alert_channel;
    use std::time::Duration;
    use telewatch_test_utils::fixtures::{alert_config, bundle, session};
    use telewatch_test_utils::services::{FakeActivityService, InMemorySessionStore, StaticSecrets};
    use telewatch_test_utils::{assert_err, assert_ok};
    use telewatch_types::config::FailoverConfig;
    use telewatch_types::AlertMessage;
    use tokio::sync::mpsc;

    const THRESHOLDS: ThresholdConfig = ThresholdConfig {
        imported_reassociate: 5,
        finalized_reassociate: 5,
        imported_notify: 0,
        finalized_notify: 0,
    };

    fn cadence() -> MonitorConfig {
        MonitorConfig {
            block_check_period_secs: 10,
            alert_chill_period_minutes: 10,
            startup_grace_secs: 30,
            status_report_secs: 60,
        }
    }

    fn context(
        store: Arc<ChainStateStore>,
        activity: Arc<FakeActivityService>,
    ) -> (MonitorContext, mpsc::Receiver<AlertMessage>) {
        let (alerts, rx) = alert_channel(&alert_config());
        let executor = FailoverExecutor::new(
            activity.clone(),
            Arc::new(StaticSecrets::new("api", "caller")),
            alerts.clone(),
            FailoverConfig::default(),
        );
        let ctx = MonitorContext {
            store,
            activity,
            executor,
            alerts,
            ledger: Arc::new(NotificationLedger::new()),
            thresholds: THRESHOLDS,
            cadence: cadence(),
        };
        (ctx, rx)
    }

    fn sms_texts(rx: &mut mpsc::Receiver<AlertMessage>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Some(sms) = message.sms {
                out.push(sms.text);
            }
        }
        out
    }

    #[test]
    fn test_lag_comparison_is_strict() {
        let store = ChainStateStore::new();
        store.record_imported("A", 100);
        store.record_imported("B", 105);
        store.record_imported("C", 106);
        let sessions = vec![session("A", "g", 1), session("B", "g", 2), session("C", "g", 3)];
        let snapshot = store.snapshot(["A", "B", "C"]);
        assert_eq!(lag_verdicts(&sessions, &snapshot, &THRESHOLDS), vec![true, false, false]);

        let pair = vec![session("A", "g", 1), session("B", "g", 2)];
        assert_eq!(lag_verdicts(&pair, &snapshot, &THRESHOLDS), vec![false, false]);
    }

    #[test]
    fn test_finalized_lag_alone_counts() {
        let store = ChainStateStore::new();
        store.record_imported("A", 100);
        store.record_imported("B", 100);
        store.record_finalized("A", 90);
        store.record_finalized("B", 97);
        let sessions = vec![session("A", "g", 1), session("B", "g", 2)];
        let snapshot = store.snapshot(["A", "B"]);
        assert_eq!(lag_verdicts(&sessions, &snapshot, &THRESHOLDS), vec![true, false]);
    }

    #[test]
    fn test_unreported_node_counts_as_zero() {
        let store = ChainStateStore::new();
        store.record_imported("A", 100);
        let sessions = vec![session("A", "g", 1), session("ghost", "g", 2)];
        let snapshot = store.snapshot(["A", "ghost"]);
        assert_eq!(lag_verdicts(&sessions, &snapshot, &THRESHOLDS), vec![false, true]);
    }

    #[test]
    fn test_partition_groups() {
        let groups = partition_groups(vec![
            session("A", "g1", 1),
            session("X", "g2", 1),
            session("B", "g1", 2),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["g1"].len(), 2);
        assert_eq!(groups["g2"][0].node_name, "X");
    }

    #[tokio::test]
    async fn test_load_groups_partitions_catalog() {
        let store = InMemorySessionStore::new(vec![
            session("A", "g1", 1),
            session("X", "g2", 1),
            session("B", "g1", 2),
        ]);
        let groups = assert_ok!(load_groups(&store).await);
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["g1", "g2"]);
        assert_eq!(groups["g1"].len(), 2);
    }

    #[tokio::test]
    async fn test_load_groups_surfaces_catalog_failure() {
        let err = assert_err!(load_groups(&InMemorySessionStore::failing()).await);
        assert!(matches!(err, ServiceError::Store(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_lagging_session_fails_over_and_notifies() {
        let store = Arc::new(ChainStateStore::new());
        store.record_imported("A", 90);
        store.record_imported("B", 100);
        store.record_imported("C", 100);
        let activity = Arc::new(FakeActivityService::new());
        activity.set_active(&["A-session"]);
        activity.set_nonce("proxyA", 4);
        activity.activate_on_submit("txB4", "B-session");

        let mut a = session("A", "g1", 1);
        a.proxy = Some("proxyA".into());
        a.transactions = bundle().series("B", 4, &["txB4"]).series("C", 4, &["txC4"]).encode();
        // Deliberately out of order; the cycle sorts by priority.
        let sessions = vec![session("C", "g1", 3), a, session("B", "g1", 2)];

        let (ctx, mut rx) = context(store, activity.clone());
        let mut monitor = GroupMonitor::new("g1", sessions, ctx);
        let report = monitor.run_cycle().await;

        assert_eq!(report.lagging, vec!["A"]);
        assert_eq!(report.flagged, vec!["A"]);
        assert_eq!(report.activations, vec![Activation { from: "A".into(), to: "B".into() }]);
        assert!(report.notified);
        let order: Vec<&str> = monitor.sessions().iter().map(|s| s.node_name.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert!(monitor.sessions()[0].stopped);
        assert_eq!(
            sms_texts(&mut rx),
            vec![
                "Requested reassociation from A to B",
                "Completed reassociation from A to B",
                "Check g1"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_lagging_session_only_notifies_once_per_chill() {
        let store = Arc::new(ChainStateStore::new());
        store.record_imported("A", 100);
        store.record_imported("B", 80);
        let activity = Arc::new(FakeActivityService::new());
        activity.set_active(&["A-session"]);
        let (ctx, mut rx) = context(store, activity.clone());
        let mut monitor = GroupMonitor::new("g1", vec![session("A", "g1", 1), session("B", "g1", 2)], ctx);

        let first = monitor.run_cycle().await;
        assert_eq!(first.lagging, vec!["B"]);
        assert!(first.flagged.is_empty());
        assert!(first.notified);
        assert!(activity.submissions().is_empty());

        tokio::time::advance(Duration::from_secs(60)).await;
        let second = monitor.run_cycle().await;
        assert!(!second.notified);

        tokio::time::advance(Duration::from_secs(540)).await;
        let third = monitor.run_cycle().await;
        assert!(third.notified);
        assert_eq!(sms_texts(&mut rx), vec!["Check g1", "Check g1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_is_stamped_after_check_alert_is_queued() {
        let store = Arc::new(ChainStateStore::new());
        store.record_imported("A", 100);
        store.record_imported("B", 80);
        let mut cfg = alert_config();
        cfg.queue_capacity = 1;
        let (alerts, mut rx) = alert_channel(&cfg);
        let (mut ctx, _executor_rx) = context(store, Arc::new(FakeActivityService::new()));
        ctx.alerts = alerts;
        let ledger = ctx.ledger.clone();
        let chill = ctx.cadence.alert_chill_period();
        let mut monitor = GroupMonitor::new("g1", vec![session("A", "g1", 1), session("B", "g1", 2)], ctx);

        // The email fills the queue, so the SMS half of "Check g1" blocks.
        let cycle = tokio::spawn(async move { monitor.run_cycle().await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!cycle.is_finished());
        assert!(ledger.is_due("g1", chill));

        assert!(rx.recv().await.unwrap().email.is_some());
        let report = cycle.await.unwrap();
        assert!(report.notified);
        assert!(!ledger.is_due("g1", chill));
        assert!(rx.recv().await.unwrap().sms.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_group_skips_activity_lookup() {
        let store = Arc::new(ChainStateStore::new());
        store.record_imported("A", 100);
        store.record_imported("B", 97);
        let activity = Arc::new(FakeActivityService::new());
        let (ctx, mut rx) = context(store, activity.clone());
        let mut monitor = GroupMonitor::new("g1", vec![session("A", "g1", 1), session("B", "g1", 2)], ctx);

        let report = monitor.run_cycle().await;
        assert_eq!(report, CycleReport::default());
        assert_eq!(activity.whos_active_calls(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_failure_means_nobody_active() {
        let store = Arc::new(ChainStateStore::new());
        store.record_imported("A", 50);
        store.record_imported("B", 100);
        let activity = Arc::new(FakeActivityService::new());
        activity.set_active(&["A-session"]);
        activity.fail_whos_active(true);
        let (ctx, _rx) = context(store, activity.clone());
        let mut monitor = GroupMonitor::new("g1", vec![session("A", "g1", 1), session("B", "g1", 2)], ctx);

        let report = monitor.run_cycle().await;
        assert_eq!(report.lagging, vec!["A"]);
        assert!(report.flagged.is_empty());
        assert!(report.notified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_synced_clears_after_recovery() {
        let store = Arc::new(ChainStateStore::new());
        store.record_imported("A", 100);
        store.record_imported("B", 10);
        let activity = Arc::new(FakeActivityService::new());
        let (ctx, _rx) = context(store.clone(), activity);
        let mut monitor = GroupMonitor::new("g1", vec![session("A", "g1", 1), session("B", "g1", 2)], ctx);

        monitor.run_cycle().await;
        assert!(monitor.sessions()[1].not_synced);
        store.record_imported("B", 100);
        monitor.run_cycle().await;
        assert!(!monitor.sessions()[1].not_synced);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_waits_for_grace_then_cycles_until_shutdown() {
        let store = Arc::new(ChainStateStore::new());
        store.record_imported("A", 100);
        store.record_imported("B", 10);
        let activity = Arc::new(FakeActivityService::new());
        let (ctx, _rx) = context(store, activity.clone());
        let monitor = GroupMonitor::new("g1", vec![session("A", "g1", 1), session("B", "g1", 2)], ctx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(monitor.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(activity.whos_active_calls(), 0);
        // Cycles at 40s, 50s and 60s.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(activity.whos_active_calls(), 3);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
