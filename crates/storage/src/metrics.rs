//! Counters for the array store and the link manager.
//!
//! All atomic operations use `Ordering::Relaxed`. Each counter is independent
//! and monotonically increasing, so a snapshot may show counters from
//! slightly different instants; that is acceptable for telemetry.
//!
//! # Usage
//!
//! ```
//! use linkbridge_storage::StoreMetrics;
//!
//! let metrics = StoreMetrics::new();
//! metrics.record_cas_attempt();
//! metrics.record_conflict();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.cas_attempts, 1);
//! assert_eq!(snapshot.conflict_rate(), 1.0);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tracing::warn;

/// Shared, cloneable counters. Clones observe the same values.
#[derive(Clone, Default)]
pub struct StoreMetrics {
    inner: Arc<StoreMetricsInner>,
}

#[derive(Default)]
struct StoreMetricsInner {
    reads: AtomicU64,
    cas_attempts: AtomicU64,
    conflicts: AtomicU64,
    noop_mutations: AtomicU64,
    retry_exhausted: AtomicU64,
    timeouts: AtomicU64,
    corrupt_reads: AtomicU64,
    partial_links: AtomicU64,
}

/// Point-in-time copy of [`StoreMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreMetricsSnapshot {
    /// Array reads, including the read half of every CAS attempt.
    pub reads: u64,
    /// Compare-and-set calls issued.
    pub cas_attempts: u64,
    /// Compare-and-set calls that lost a race.
    pub conflicts: u64,
    /// Mutations that found the desired state already present and skipped the write.
    pub noop_mutations: u64,
    /// Operations that ran out of CAS attempts.
    pub retry_exhausted: u64,
    /// Operations aborted by their deadline.
    pub timeouts: u64,
    /// Stored values that failed to decode.
    pub corrupt_reads: u64,
    /// Link or unlink calls that updated only one side.
    pub partial_links: u64,
}

impl StoreMetricsSnapshot {
    /// Fraction of CAS attempts that lost a race.
    #[must_use]
    pub fn conflict_rate(&self) -> f64 {
        if self.cas_attempts == 0 {
            return 0.0;
        }
        self.conflicts as f64 / self.cas_attempts as f64
    }
}

impl StoreMetrics {
    /// Creates a collector with every counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a read of an array record.
    pub fn record_read(&self) {
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a compare-and-set call.
    pub fn record_cas_attempt(&self) {
        self.inner.cas_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lost compare-and-set race.
    pub fn record_conflict(&self) {
        self.inner.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a mutation that needed no write.
    pub fn record_noop(&self) {
        self.inner.noop_mutations.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an operation that exhausted its CAS budget.
    pub fn record_retry_exhausted(&self) {
        self.inner.retry_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an operation aborted by its deadline.
    pub fn record_timeout(&self) {
        self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a stored value that failed to decode.
    pub fn record_corrupt_read(&self) {
        self.inner.corrupt_reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a link or unlink applied to one side only.
    pub fn record_partial_link(&self) {
        self.inner.partial_links.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        StoreMetricsSnapshot {
            reads: self.inner.reads.load(Ordering::Relaxed),
            cas_attempts: self.inner.cas_attempts.load(Ordering::Relaxed),
            conflicts: self.inner.conflicts.load(Ordering::Relaxed),
            noop_mutations: self.inner.noop_mutations.load(Ordering::Relaxed),
            retry_exhausted: self.inner.retry_exhausted.load(Ordering::Relaxed),
            timeouts: self.inner.timeouts.load(Ordering::Relaxed),
            corrupt_reads: self.inner.corrupt_reads.load(Ordering::Relaxed),
            partial_links: self.inner.partial_links.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters at INFO level, warning on high contention.
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();

        if snapshot.reads == 0 && snapshot.cas_attempts == 0 {
            return;
        }

        tracing::info!(
            reads = snapshot.reads,
            cas_attempts = snapshot.cas_attempts,
            conflicts = snapshot.conflicts,
            conflict_rate = snapshot.conflict_rate(),
            noop_mutations = snapshot.noop_mutations,
            retry_exhausted = snapshot.retry_exhausted,
            timeouts = snapshot.timeouts,
            corrupt_reads = snapshot.corrupt_reads,
            partial_links = snapshot.partial_links,
            "Array store metrics snapshot"
        );

        if snapshot.conflict_rate() > 0.25 {
            warn!(
                conflict_rate = snapshot.conflict_rate(),
                conflicts = snapshot.conflicts,
                "High compare-and-set contention detected"
            );
        }

        if snapshot.partial_links > 0 {
            warn!(partial_links = snapshot.partial_links, "Asymmetric links may need repair");
        }
    }
}

impl std::fmt::Debug for StoreMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreMetrics").field("snapshot", &self.snapshot()).finish()
    }
}
