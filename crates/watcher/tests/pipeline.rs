// Path: crates/watcher/tests/pipeline.rs
//! End-to-end runs of the watcher tasks wired together against in-memory fakes.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use telewatch_test_utils::feed::ScriptedConnector;
use telewatch_test_utils::fixtures::{alert_config, bundle, frame, session};
use telewatch_test_utils::notifier::RecordingNotifier;
use telewatch_test_utils::services::{FakeActivityService, StaticSecrets};
use telewatch_test_utils::{assert_ok, wait_until};
use telewatch_types::config::{FailoverConfig, MonitorConfig, TelemetryFeedConfig, ThresholdConfig};
use telewatch_types::Session;
use telewatch_watcher::monitor::MonitorContext;
use telewatch_watcher::{
    alert_channel, AlertDispatcher, ChainStateStore, FailoverExecutor, FeedSupervisor,
    GroupMonitor, NotificationLedger, TelemetryDecoder,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

struct Harness {
    store: Arc<ChainStateStore>,
    notifier: Arc<RecordingNotifier>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Harness {
    fn start(
        connector: Arc<ScriptedConnector>,
        activity: Arc<FakeActivityService>,
        sessions: Vec<Session>,
    ) -> Self {
        let feed = TelemetryFeedConfig {
            host: "telemetry.test".into(),
            telemetry_id: "0xchain".into(),
            scheme: "ws".into(),
            reconnect_delay_secs: 3,
            max_reconnect_attempts: 10,
            frame_queue_capacity: 64,
        };
        let store = Arc::new(ChainStateStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (alerts, alert_rx) = alert_channel(&alert_config());
        let (frames_tx, frames_rx) = mpsc::channel(feed.frame_queue_capacity);

        let executor = FailoverExecutor::new(
            activity.clone(),
            Arc::new(StaticSecrets::new("api", "caller")),
            alerts.clone(),
            FailoverConfig::default(),
        );
        let ctx = MonitorContext {
            store: store.clone(),
            activity,
            executor,
            alerts,
            ledger: Arc::new(NotificationLedger::new()),
            thresholds: ThresholdConfig {
                imported_reassociate: 5,
                finalized_reassociate: 5,
                imported_notify: 0,
                finalized_notify: 0,
            },
            cadence: MonitorConfig {
                block_check_period_secs: 10,
                alert_chill_period_minutes: 10,
                startup_grace_secs: 30,
                status_report_secs: 60,
            },
        };

        let supervisor = FeedSupervisor::new(connector, &feed, store.clone(), frames_tx);
        let feed_shutdown = shutdown_rx.clone();
        let tasks = vec![
            tokio::spawn(async move {
                assert_ok!(supervisor.run(feed_shutdown).await);
            }),
            tokio::spawn(TelemetryDecoder::new(store.clone()).run(frames_rx, shutdown_rx.clone())),
            tokio::spawn(
                AlertDispatcher::new(notifier.clone(), Duration::from_secs(2))
                    .run(alert_rx, shutdown_rx.clone()),
            ),
            tokio::spawn(GroupMonitor::new("g1", sessions, ctx).run(shutdown_rx)),
        ];
        Self {
            store,
            notifier,
            shutdown,
            tasks,
        }
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        for task in self.tasks {
            task.await.unwrap();
        }
    }
}

fn feed_with_heights(a: u64, b: u64, c: u64) -> Arc<ScriptedConnector> {
    let connector = Arc::new(ScriptedConnector::new());
    connector.accept(vec![
        Ok(frame(json!([
            3, [1, ["A", "node", "1.0"]],
            3, [2, ["B", "node", "1.0"]],
            3, [3, ["C", "node", "1.0"]]
        ]))),
        Ok(frame(json!([
            6, [1, [a, "0xa"]],
            6, [2, [b, "0xb"]],
            6, [3, [c, "0xc"]]
        ]))),
    ]);
    connector
}

fn group_with_bundle() -> Vec<Session> {
    let mut a = session("A", "g1", 1);
    a.proxy = Some("proxyA".into());
    a.transactions = bundle()
        .series("B", 4, &["txB4"])
        .series("C", 4, &["txC4"])
        .encode();
    vec![a, session("B", "g1", 2), session("C", "g1", 3)]
}

#[tokio::test(start_paused = true)]
async fn test_lagging_active_node_is_replaced_by_next_priority() {
    let activity = Arc::new(FakeActivityService::new());
    activity.set_active(&["A-session"]);
    activity.set_nonce("proxyA", 4);
    activity.activate_on_submit("txB4", "B-session");

    let harness = Harness::start(feed_with_heights(90, 100, 100), activity.clone(), group_with_bundle());

    wait_until!(180, harness
        .notifier
        .sms_texts()
        .iter()
        .any(|t| t == "Check g1"));

    assert_eq!(harness.store.node_count(), 3);
    assert_eq!(harness.store.heights("A").imported, 90);
    assert_eq!(
        activity.submissions(),
        vec![("txB4".to_string(), "caller".to_string())]
    );
    assert_eq!(
        harness.notifier.sms_texts(),
        vec![
            "Requested reassociation from A to B",
            "Completed reassociation from A to B",
            "Check g1",
        ]
    );

    // Later cycles neither fail A over again nor re-alert within the chill period.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(activity.submissions().len(), 1);
    assert_eq!(harness.notifier.sms_texts().len(), 3);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_healthy_backup_only_alerts() {
    let activity = Arc::new(FakeActivityService::new());
    activity.set_active(&["A-session"]);
    activity.set_nonce("proxyA", 4);

    // B lags along with A, C has no pre-signed transaction for nonce 4.
    let mut sessions = group_with_bundle();
    sessions[0].transactions = bundle().series("C", 9, &["txC9"]).encode();
    let harness = Harness::start(feed_with_heights(90, 91, 100), activity.clone(), sessions);

    wait_until!(120, !harness.notifier.sms_texts().is_empty());
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(activity.submissions().is_empty());
    assert_eq!(harness.notifier.sms_texts(), vec!["Check g1"]);

    harness.stop().await;
}
