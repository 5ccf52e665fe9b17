//! Backend metrics for the Trickster caching proxy.
//!
//! Enable the `metrics` feature to record these. All metrics follow the
//! pattern `trickster_backend_{operation}_{metric_type}`.

use std::time::Duration;

#[cfg(feature = "metrics")]
use std::time::Instant;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

/// Zero-cost timer for metrics collection.
pub struct Timer {
    #[cfg(feature = "metrics")]
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    #[inline]
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "metrics")]
            start: Instant::now(),
        }
    }

    /// Elapsed time since creation. `Duration::ZERO` when metrics are disabled.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        #[cfg(feature = "metrics")]
        {
            self.start.elapsed()
        }
        #[cfg(not(feature = "metrics"))]
        {
            Duration::ZERO
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "metrics")]
lazy_static! {
    /// Metric name for backend read-duration histogram.
    pub static ref BACKEND_READ_DURATION: &'static str = {
        metrics::describe_histogram!(
            "trickster_backend_read_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of cache backend read operations in seconds."
        );
        "trickster_backend_read_duration_seconds"
    };
    /// Metric name for backend write-duration histogram.
    pub static ref BACKEND_WRITE_DURATION: &'static str = {
        metrics::describe_histogram!(
            "trickster_backend_write_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of cache backend write operations in seconds."
        );
        "trickster_backend_write_duration_seconds"
    };
    /// Metric name for backend remove counter.
    pub static ref BACKEND_REMOVE_TOTAL: &'static str = {
        metrics::describe_counter!(
            "trickster_backend_remove_total",
            "Total number of cache backend remove operations."
        );
        "trickster_backend_remove_total"
    };
}

/// Record a read operation's duration.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_read(backend: &str, duration: Duration) {
    metrics::histogram!(*BACKEND_READ_DURATION, "backend" => backend.to_string())
        .record(duration.as_secs_f64());
}

/// Record a read operation (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_read(_backend: &str, _duration: Duration) {}

/// Record a write operation's duration.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_write(backend: &str, duration: Duration) {
    metrics::histogram!(*BACKEND_WRITE_DURATION, "backend" => backend.to_string())
        .record(duration.as_secs_f64());
}

/// Record a write operation (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_write(_backend: &str, _duration: Duration) {}

/// Record a remove operation.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_remove(backend: &str) {
    metrics::counter!(*BACKEND_REMOVE_TOTAL, "backend" => backend.to_string()).increment(1);
}

/// Record a remove operation (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_remove(_backend: &str) {}
