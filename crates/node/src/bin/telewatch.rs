// Path: crates/node/src/bin/telewatch.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telewatch_api::ActivityService;
use telewatch_telemetry::http::run_server;
use telewatch_types::WatchConfig;
use telewatch_watcher::monitor::{load_groups, MonitorContext};
use telewatch_watcher::services::{
    notifier_from_config, secrets_from_config, HttpActivityService, JsonFileSessionStore,
};
use telewatch_watcher::status::run_status_reporter;
use telewatch_watcher::{
    alert_channel, AlertDispatcher, ChainStateStore, FailoverExecutor,
    FeedSupervisor, GroupMonitor, NotificationLedger, TelemetryDecoder, WsConnector,
};
use tokio::sync::{mpsc, watch};

#[derive(Parser, Debug)]
#[clap(name = "telewatch", about = "Watches validator telemetry and fails lagging sessions over")]
struct TelewatchOpts {
    #[clap(long, env = "TELEWATCH_CONFIG", default_value = "telewatch.toml")]
    config: PathBuf,
    #[clap(
        long,
        env = "TELEWATCH_METRICS_ADDR",
        help = "Overrides metrics_addr in telewatch.toml"
    )]
    metrics_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    telewatch_telemetry::init::init_tracing()?;
    let opts = TelewatchOpts::parse();
    tracing::info!(target: "node", event = "startup", config = %opts.config.display());

    let config = WatchConfig::load(&opts.config)
        .with_context(|| format!("loading {}", opts.config.display()))?;

    let sink = telewatch_telemetry::prometheus::install()?;
    if telewatch_telemetry::sinks::SINK.set(sink).is_err() {
        tracing::warn!(target: "node", "Metrics sink was already installed");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let metrics_addr: SocketAddr = opts
        .metrics_addr
        .unwrap_or_else(|| config.metrics_addr.clone())
        .parse()
        .context("parsing metrics address")?;
    tasks.push(tokio::spawn(run_server(metrics_addr, shutdown_rx.clone())));

    let secrets = secrets_from_config(&config.secrets);
    let activity: Arc<dyn ActivityService> =
        Arc::new(HttpActivityService::new(&config.rest, secrets.clone())?);
    let notifier = notifier_from_config(&config.alerts)?;

    let groups = load_groups(&JsonFileSessionStore::new(&config.sessions.path))
        .await
        .context("loading session catalog")?;

    let store = Arc::new(ChainStateStore::new());
    let (alerts, alert_rx) = alert_channel(&config.alerts);
    tasks.push(tokio::spawn(
        AlertDispatcher::new(notifier, config.alerts.min_delivery_gap())
            .run(alert_rx, shutdown_rx.clone()),
    ));
    tasks.push(tokio::spawn(run_status_reporter(
        store.clone(),
        Duration::from_secs(config.monitor.status_report_secs),
        shutdown_rx.clone(),
    )));

    let executor = FailoverExecutor::new(activity.clone(), secrets, alerts.clone(), config.failover);
    let ctx = MonitorContext {
        store: store.clone(),
        activity,
        executor,
        alerts,
        ledger: Arc::new(NotificationLedger::new()),
        thresholds: config.thresholds,
        cadence: config.monitor.clone(),
    };
    for (group, members) in groups {
        tasks.push(tokio::spawn(
            GroupMonitor::new(group, members, ctx.clone()).run(shutdown_rx.clone()),
        ));
    }

    let (frames_tx, frames_rx) = mpsc::channel(config.telemetry.frame_queue_capacity.max(1));
    tasks.push(tokio::spawn(
        TelemetryDecoder::new(store.clone()).run(frames_rx, shutdown_rx.clone()),
    ));
    let supervisor = FeedSupervisor::new(Arc::new(WsConnector), &config.telemetry, store, frames_tx);
    let mut feed = tokio::spawn(supervisor.run(shutdown_rx));

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            tracing::info!(target: "node", event = "shutdown", "Interrupt received");
            signal.map_err(anyhow::Error::from)
        }
        joined = &mut feed => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!(target: "node", error = %e, "Telemetry feed failed permanently");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        },
    };

    let _ = shutdown_tx.send(true);
    if !feed.is_finished() {
        tasks.push(tokio::spawn(async move {
            let _ = feed.await;
        }));
    }
    for task in tasks {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            tracing::warn!(target: "node", "Task did not stop in time");
        }
    }
    tracing::info!(target: "node", event = "stopped");
    outcome
}
