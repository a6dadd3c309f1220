//! Observability for send operations.
//!
//! Provides failure logging at the severity of the error kind, send
//! counters and a timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::errors::{ErrorSeverity, MailError};

/// Send metrics collector.
#[derive(Debug, Default)]
pub struct SendMetrics {
    /// Messages accepted by the transport.
    pub sent: AtomicU64,
    /// Requests rejected before reaching the transport.
    pub rejected: AtomicU64,
    /// Sends that failed at the transport.
    pub failed: AtomicU64,
}

impl SendMetrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful send.
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failure, counted by where it happened.
    pub fn record_failure(&self, error: &MailError) {
        let counter = match error.severity() {
            ErrorSeverity::Info => &self.rejected,
            ErrorSeverity::Warning => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages accepted by the transport.
    pub sent: u64,
    /// Requests rejected before reaching the transport.
    pub rejected: u64,
    /// Sends that failed at the transport.
    pub failed: u64,
}

/// Logs a failed send once, at the severity of its kind.
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
pub fn log_failure(error: &MailError) {
    #[cfg(feature = "tracing")]
    match error.severity() {
        ErrorSeverity::Info => tracing::info!(
            kind = %error.kind(),
            "Mail request rejected: {}",
            error
        ),
        ErrorSeverity::Warning => tracing::warn!(
            kind = %error.kind(),
            smtp_code = ?error.smtp_code(),
            "Mail delivery failed: {}",
            error
        ),
    };
}

/// Timer for measuring operation duration.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    /// Creates and starts a new timer.
    pub fn start(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Stops the timer and returns the duration.
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            timer = self.name,
            duration_ms = elapsed.as_millis() as u64,
            "Timer stopped"
        );

        elapsed
    }
}
