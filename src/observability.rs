use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Flow engine counters, shared by every submission in the process
#[derive(Debug, Default)]
pub struct FlowMetrics {
    pub submissions: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub rollbacks: AtomicU64,
    pub revert_failures: AtomicU64,
    pub lock_timeouts: AtomicU64,
    pub async_enqueued: AtomicU64,
}

impl FlowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submission(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_revert_failure(&self) {
        self.revert_failures.fetch_add(1, Ordering::Relaxed);
        warn!("Compensating action failed");
    }

    pub fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enqueued(&self) {
        self.async_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> FlowStats {
        FlowStats {
            submissions: self.submissions.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            revert_failures: self.revert_failures.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            async_enqueued: self.async_enqueued.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Flow metrics: submissions={}, succeeded={}, failed={}, rollbacks={}, revert_failures={}, lock_timeouts={}, async_enqueued={}",
            stats.submissions,
            stats.succeeded,
            stats.failed,
            stats.rollbacks,
            stats.revert_failures,
            stats.lock_timeouts,
            stats.async_enqueued
        );
    }
}

#[derive(Debug, Clone)]
pub struct FlowStats {
    pub submissions: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rollbacks: u64,
    pub revert_failures: u64,
    pub lock_timeouts: u64,
    pub async_enqueued: u64,
}

/// Global metrics instance
static FLOW_METRICS: std::sync::LazyLock<FlowMetrics> = std::sync::LazyLock::new(FlowMetrics::new);

pub fn flow_metrics() -> &'static FlowMetrics {
    &FLOW_METRICS
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        duration
    }
}
