// Path: crates/telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling the watcher core from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when metrics are disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns a static reference to the configured metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn metrics() -> &'static dyn MetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured error metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics related to the telemetry feed connection.
pub trait FeedMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of raw frames read off the socket.
    fn inc_frames_received(&self);
    /// Increments the counter of reconnect attempts.
    fn inc_reconnect_attempts(&self);
    /// Sets the gauge for the number of nodes currently reported by the feed.
    fn set_tracked_nodes(&self, count: i64);
}
impl FeedMetricsSink for NopSink {
    fn inc_frames_received(&self) {}
    fn inc_reconnect_attempts(&self) {}
    fn set_tracked_nodes(&self, _count: i64) {}
}

/// A sink for metrics related to decoding telemetry records.
pub trait DecoderMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for records dropped, labeled by reason.
    fn inc_records_dropped(&self, reason: &'static str);
}
impl DecoderMetricsSink for NopSink {
    fn inc_records_dropped(&self, _reason: &'static str) {}
}

/// A sink for metrics related to group monitoring cycles.
pub trait MonitorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Sets the gauge of lagging sessions observed in the last cycle, labeled by group.
    fn set_lagging_sessions(&self, group: &str, count: i64);
    /// Observes the duration of a single monitoring cycle.
    fn observe_cycle_duration(&self, duration_secs: f64);
}
impl MonitorMetricsSink for NopSink {
    fn set_lagging_sessions(&self, _group: &str, _count: i64) {}
    fn observe_cycle_duration(&self, _duration_secs: f64) {}
}

/// A sink for metrics related to failover attempts.
pub trait FailoverMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter of failover attempts, labeled by outcome.
    fn inc_failover(&self, outcome: &'static str);
}
impl FailoverMetricsSink for NopSink {
    fn inc_failover(&self, _outcome: &'static str) {}
}

/// A sink for metrics related to operator alerts.
pub trait AlertMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter of alert deliveries, labeled by result.
    fn inc_alerts(&self, result: &'static str);
}
impl AlertMetricsSink for NopSink {
    fn inc_alerts(&self, _result: &'static str) {}
}

/// A sink for recording structured error metrics.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for a specific error, categorized by its kind and variant.
    fn inc_error(&self, kind: &'static str, variant: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _variant: &'static str) {}
}

/// A unified sink that implements all domain-specific traits, providing a single
/// point of implementation for metrics backends like Prometheus.
pub trait MetricsSink:
    FeedMetricsSink
    + DecoderMetricsSink
    + MonitorMetricsSink
    + FailoverMetricsSink
    + AlertMetricsSink
    + ErrorMetricsSink
{
}

// Blanket implementation to allow any type that implements all sub-traits
// to be used as a `MetricsSink`.
impl<T> MetricsSink for T where
    T: FeedMetricsSink
        + DecoderMetricsSink
        + MonitorMetricsSink
        + FailoverMetricsSink
        + AlertMetricsSink
        + ErrorMetricsSink
{
}
