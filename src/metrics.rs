// Intake metrics
//
// Lock-free counters shared by the coordinator and logged on shutdown

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters for the lifetime of the process
///
/// Uses atomic operations so the coordinator task can record while `main`
/// (or a control surface) reads without locks.
#[derive(Debug)]
pub struct Metrics {
    /// Items packaged into the output area
    pub items_processed: AtomicUsize,

    /// Items whose handler failed (then quarantined)
    pub items_failed: AtomicUsize,

    /// Items moved to Staging untouched, either with processing disabled or after a failure
    pub items_quarantined: AtomicUsize,

    /// Admissions refused by the staging lock
    pub items_deferred: AtomicUsize,

    /// Paths gone before dispatch
    pub items_vanished: AtomicUsize,

    /// Conversions that fell back to the original file
    pub conversion_fallbacks: AtomicUsize,

    /// Total handler time in milliseconds
    pub total_handler_time_ms: AtomicU64,

    /// Queue drains triggered by a rescan
    pub rescans: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            items_processed: AtomicUsize::new(0),
            items_failed: AtomicUsize::new(0),
            items_quarantined: AtomicUsize::new(0),
            items_deferred: AtomicUsize::new(0),
            items_vanished: AtomicUsize::new(0),
            conversion_fallbacks: AtomicUsize::new(0),
            total_handler_time_ms: AtomicU64::new(0),
            rescans: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_processed(&self, handler_time: Duration, fallbacks: usize) {
        self.items_processed.fetch_add(1, Ordering::Relaxed);
        self.conversion_fallbacks.fetch_add(fallbacks, Ordering::Relaxed);
        self.record_handler_time(handler_time);
    }

    pub fn record_failed(&self, handler_time: Duration) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
        self.record_handler_time(handler_time);
    }

    pub fn record_quarantined(&self) {
        self.items_quarantined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deferred(&self) {
        self.items_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_vanished(&self) {
        self.items_vanished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rescan(&self) {
        self.rescans.fetch_add(1, Ordering::Relaxed);
    }

    fn record_handler_time(&self, duration: Duration) {
        self.total_handler_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Items dispatched to a handler, whether or not they succeeded
    pub fn items_handled(&self) -> usize {
        self.items_processed.load(Ordering::Relaxed) + self.items_failed.load(Ordering::Relaxed)
    }

    /// Average handler time per dispatched item in milliseconds
    pub fn avg_handler_time_ms(&self) -> f64 {
        let total = self.total_handler_time_ms.load(Ordering::Relaxed);
        let count = self.items_handled();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Intake Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Items: {} processed, {} failed, {} quarantined, {} deferred, {} vanished",
            self.items_processed.load(Ordering::Relaxed),
            self.items_failed.load(Ordering::Relaxed),
            self.items_quarantined.load(Ordering::Relaxed),
            self.items_deferred.load(Ordering::Relaxed),
            self.items_vanished.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Handler time: {:.2}s (avg: {:.2}ms per item), conversion fallbacks: {}",
            self.total_handler_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_handler_time_ms(),
            self.conversion_fallbacks.load(Ordering::Relaxed)
        );
        tracing::info!("Rescans: {}", self.rescans.load(Ordering::Relaxed));
    }

    /// One-line variant for periodic logging
    pub fn log_periodic(&self) {
        tracing::info!(
            "Metrics: {} items handled, {} quarantined, {} deferred, uptime {:.0}s",
            self.items_handled(),
            self.items_quarantined.load(Ordering::Relaxed),
            self.items_deferred.load(Ordering::Relaxed),
            self.uptime().as_secs_f64()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.items_processed.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.items_failed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_outcomes() {
        let metrics = Metrics::new();

        metrics.record_processed(Duration::from_millis(100), 2);
        metrics.record_processed(Duration::from_millis(300), 0);
        metrics.record_failed(Duration::from_millis(200));
        metrics.record_quarantined();
        metrics.record_deferred();
        metrics.record_vanished();

        assert_eq!(metrics.items_processed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.items_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.conversion_fallbacks.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.total_handler_time_ms.load(Ordering::Relaxed), 600);
        assert_eq!(metrics.avg_handler_time_ms(), 200.0);
        assert_eq!(metrics.items_quarantined.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.items_deferred.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.items_vanished.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_avg_handler_time_no_items() {
        assert_eq!(Metrics::new().avg_handler_time_ms(), 0.0);
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
