// Path: crates/telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec,
};

// --- Metric Statics ---
// Collectors are set exactly once by `install`.

static FEED_TRACKED_NODES: OnceCell<IntGauge> = OnceCell::new();
static FEED_FRAMES_RECEIVED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static FEED_RECONNECT_ATTEMPTS_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static DECODER_RECORDS_DROPPED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static MONITOR_LAGGING_SESSIONS: OnceCell<IntGaugeVec> = OnceCell::new();
static MONITOR_CYCLE_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();
static FAILOVER_ATTEMPTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static ALERTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Resolves a collector, returning early from the recording method if `install()`
/// has not run.
macro_rules! get_metric {
    ($metric:ident) => {
        match $metric.get() {
            Some(metric) => metric,
            None => return,
        }
    };
}

fn put<T>(cell: &OnceCell<T>, collector: T) -> Result<(), prometheus::Error> {
    cell.set(collector).map_err(|_| prometheus::Error::AlreadyReg)
}

impl FeedMetricsSink for PrometheusSink {
    fn inc_frames_received(&self) {
        get_metric!(FEED_FRAMES_RECEIVED_TOTAL).inc();
    }
    fn inc_reconnect_attempts(&self) {
        get_metric!(FEED_RECONNECT_ATTEMPTS_TOTAL).inc();
    }
    fn set_tracked_nodes(&self, count: i64) {
        get_metric!(FEED_TRACKED_NODES).set(count);
    }
}

impl DecoderMetricsSink for PrometheusSink {
    fn inc_records_dropped(&self, reason: &'static str) {
        get_metric!(DECODER_RECORDS_DROPPED_TOTAL)
            .with_label_values(&[reason])
            .inc();
    }
}

impl MonitorMetricsSink for PrometheusSink {
    fn set_lagging_sessions(&self, group: &str, count: i64) {
        get_metric!(MONITOR_LAGGING_SESSIONS)
            .with_label_values(&[group])
            .set(count);
    }
    fn observe_cycle_duration(&self, duration_secs: f64) {
        get_metric!(MONITOR_CYCLE_DURATION_SECONDS).observe(duration_secs);
    }
}

impl FailoverMetricsSink for PrometheusSink {
    fn inc_failover(&self, outcome: &'static str) {
        get_metric!(FAILOVER_ATTEMPTS_TOTAL)
            .with_label_values(&[outcome])
            .inc();
    }
}

impl AlertMetricsSink for PrometheusSink {
    fn inc_alerts(&self, result: &'static str) {
        get_metric!(ALERTS_TOTAL).with_label_values(&[result]).inc();
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, kind: &'static str, variant: &'static str) {
        get_metric!(ERRORS_TOTAL)
            .with_label_values(&[kind, variant])
            .inc();
    }
}

/// Initializes all Prometheus metrics collectors and returns a static reference to the sink.
/// This function must be called only once at application startup.
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    put(
        &FEED_TRACKED_NODES,
        register_int_gauge!(
            "telewatch_feed_tracked_nodes",
            "Number of nodes currently reported by the telemetry feed."
        )?,
    )?;
    put(
        &FEED_FRAMES_RECEIVED_TOTAL,
        register_int_counter!(
            "telewatch_feed_frames_received_total",
            "Total raw frames read from the telemetry feed."
        )?,
    )?;
    put(
        &FEED_RECONNECT_ATTEMPTS_TOTAL,
        register_int_counter!(
            "telewatch_feed_reconnect_attempts_total",
            "Total attempts to (re)connect to the telemetry feed."
        )?,
    )?;
    put(
        &DECODER_RECORDS_DROPPED_TOTAL,
        register_int_counter_vec!(
            "telewatch_decoder_records_dropped_total",
            "Total telemetry records dropped by the decoder.",
            &["reason"]
        )?,
    )?;
    put(
        &MONITOR_LAGGING_SESSIONS,
        register_int_gauge_vec!(
            "telewatch_monitor_lagging_sessions",
            "Sessions found lagging their group in the last monitoring cycle.",
            &["group"]
        )?,
    )?;
    put(
        &MONITOR_CYCLE_DURATION_SECONDS,
        register_histogram!(
            "telewatch_monitor_cycle_duration_seconds",
            "Latency of a single group monitoring cycle, failover included.",
            exponential_buckets(0.001, 2.0, 18)?
        )?,
    )?;
    put(
        &FAILOVER_ATTEMPTS_TOTAL,
        register_int_counter_vec!(
            "telewatch_failover_attempts_total",
            "Total failover attempts, labeled by outcome.",
            &["outcome"]
        )?,
    )?;
    put(
        &ALERTS_TOTAL,
        register_int_counter_vec!(
            "telewatch_alerts_total",
            "Total operator alert deliveries, labeled by result.",
            &["result"]
        )?,
    )?;
    put(
        &ERRORS_TOTAL,
        register_int_counter_vec!(
            "telewatch_errors_total",
            "Total number of errors, categorized by type and variant.",
            &["kind", "variant"]
        )?,
    )?;

    static SINK: PrometheusSink = PrometheusSink;
    Ok(&SINK)
}
