use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::moderation::classifier::ErrorClass;

/// Transition outcome counters
#[derive(Debug, Default)]
pub struct TransitionMetrics {
    pub requested: AtomicU64,
    pub rejected_locally: AtomicU64,
    pub cancelled: AtomicU64,
    pub busy: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub referential_integrity_blocks: AtomicU64,
    pub auth_teardowns: AtomicU64,
    pub refetch_failures: AtomicU64,
}

impl TransitionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_requested(&self) {
        self.requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_locally(&self) {
        self.rejected_locally.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_busy(&self) {
        self.busy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self, class: ErrorClass) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        match class {
            ErrorClass::ReferentialIntegrityError => {
                self.referential_integrity_blocks.fetch_add(1, Ordering::Relaxed);
            }
            ErrorClass::AuthError => {
                self.auth_teardowns.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_refetch_failure(&self) {
        self.refetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> TransitionStats {
        TransitionStats {
            requested: self.requested.load(Ordering::Relaxed),
            rejected_locally: self.rejected_locally.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            referential_integrity_blocks: self.referential_integrity_blocks.load(Ordering::Relaxed),
            auth_teardowns: self.auth_teardowns.load(Ordering::Relaxed),
            refetch_failures: self.refetch_failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            requested = stats.requested,
            rejected_locally = stats.rejected_locally,
            cancelled = stats.cancelled,
            busy = stats.busy,
            succeeded = stats.succeeded,
            failed = stats.failed,
            referential_integrity_blocks = stats.referential_integrity_blocks,
            auth_teardowns = stats.auth_teardowns,
            refetch_failures = stats.refetch_failures,
            "Transition metrics"
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionStats {
    pub requested: u64,
    pub rejected_locally: u64,
    pub cancelled: u64,
    pub busy: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub referential_integrity_blocks: u64,
    pub auth_teardowns: u64,
    pub refetch_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_counters_split_by_class() {
        let metrics = TransitionMetrics::new();
        metrics.record_failed(ErrorClass::ReferentialIntegrityError);
        metrics.record_failed(ErrorClass::AuthError);
        metrics.record_failed(ErrorClass::TransientError);

        let stats = metrics.get_stats();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.referential_integrity_blocks, 1);
        assert_eq!(stats.auth_teardowns, 1);
    }
}
