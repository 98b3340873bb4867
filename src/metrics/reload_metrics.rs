//! Reload metrics tracking using OpenTelemetry.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::time::Instant;

/// Metrics collector for reload operations.
///
/// Tracks reload attempts, success/failure rates, reload latency, rollback
/// results and the number of tracked files using OpenTelemetry metrics.
///
/// # Examples
///
/// ```rust,no_run
/// use config_reload::metrics::ReloadMetrics;
/// use opentelemetry::global;
///
/// let metrics = ReloadMetrics::new(global::meter("config-reload"));
///
/// let timer = metrics.start_reload();
/// // ... decode the file ...
/// metrics.record_reload_success(timer);
/// ```
#[derive(Clone)]
pub struct ReloadMetrics {
    reload_attempts: Counter<u64>,
    reload_success: Counter<u64>,
    reload_failures: Counter<u64>,
    reload_duration: Histogram<f64>,
    rollbacks: Counter<u64>,
    tracked_files: Gauge<i64>,
}

impl ReloadMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let reload_attempts = meter
            .u64_counter("config_reload.reload.attempts")
            .with_description("Total number of reload attempts")
            .build();

        let reload_success = meter
            .u64_counter("config_reload.reload.success")
            .with_description("Number of successful reloads")
            .build();

        let reload_failures = meter
            .u64_counter("config_reload.reload.failures")
            .with_description("Number of failed reloads")
            .build();

        let reload_duration = meter
            .f64_histogram("config_reload.reload.duration")
            .with_description("Duration of read and decode in seconds")
            .with_unit("s")
            .build();

        let rollbacks = meter
            .u64_counter("config_reload.rollbacks")
            .with_description("Restores of last good file contents, by result")
            .build();

        let tracked_files = meter
            .i64_gauge("config_reload.tracked_files")
            .with_description("Number of tracked configuration files")
            .build();

        Self {
            reload_attempts,
            reload_success,
            reload_failures,
            reload_duration,
            rollbacks,
            tracked_files,
        }
    }

    /// Start a reload timer.
    ///
    /// Pass the returned `Instant` to `record_reload_success` or
    /// `record_reload_failure` once the reload completes.
    pub fn start_reload(&self) -> Instant {
        self.reload_attempts.add(1, &[]);
        Instant::now()
    }

    /// Record a successful reload.
    pub fn record_reload_success(&self, start: Instant) {
        self.reload_success.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a failed reload.
    pub fn record_reload_failure(&self, start: Instant) {
        self.reload_failures.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a rollback attempt and whether the restore write succeeded.
    pub fn record_rollback(&self, restored: bool) {
        let result = if restored { "restored" } else { "failed" };
        self.rollbacks.add(1, &[KeyValue::new("result", result)]);
    }

    /// Update the number of tracked files.
    pub fn update_tracked_files(&self, count: usize) {
        self.tracked_files
            .record(i64::try_from(count).unwrap_or(i64::MAX), &[]);
    }
}
