use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle counters for one [`Harness`](crate::harness::Harness) and every
/// module it provisioned. Destroy failures never fail a test, so this is
/// where they become visible beyond the log line.
#[derive(Debug, Default)]
pub struct HarnessStats {
    applies_started: AtomicU64,
    applies_succeeded: AtomicU64,
    apply_retries: AtomicU64,
    destroy_attempts: AtomicU64,
    destroys_succeeded: AtomicU64,
    destroy_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub applies_started: u64,
    pub applies_succeeded: u64,
    pub apply_retries: u64,
    pub destroy_attempts: u64,
    pub destroys_succeeded: u64,
    pub destroy_failures: u64,
}

impl HarnessStats {
    pub(crate) fn record_apply_started(&self) {
        self.applies_started.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_apply_succeeded(&self) {
        self.applies_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_apply_retry(&self) {
        self.apply_retries.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_destroy_attempt(&self) {
        self.destroy_attempts.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_destroy_succeeded(&self) {
        self.destroys_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_destroy_failure(&self) {
        self.destroy_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            applies_started: self.applies_started.load(Ordering::SeqCst),
            applies_succeeded: self.applies_succeeded.load(Ordering::SeqCst),
            apply_retries: self.apply_retries.load(Ordering::SeqCst),
            destroy_attempts: self.destroy_attempts.load(Ordering::SeqCst),
            destroys_succeeded: self.destroys_succeeded.load(Ordering::SeqCst),
            destroy_failures: self.destroy_failures.load(Ordering::SeqCst),
        }
    }
}
