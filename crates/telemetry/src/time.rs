// Path: crates/telemetry/src/time.rs
use crate::sinks::MonitorMetricsSink;
use std::time::Instant;

/// Reports the elapsed time of a monitoring cycle to the sink when dropped.
pub struct Timer<'a> {
    sink: &'a dyn MonitorMetricsSink,
    start: Instant,
}

impl<'a> Timer<'a> {
    pub fn new(sink: &'a dyn MonitorMetricsSink) -> Self {
        Self {
            sink,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_cycle_duration(self.start.elapsed().as_secs_f64());
    }
}
