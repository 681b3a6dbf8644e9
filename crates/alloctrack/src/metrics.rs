//! Atomic counters for registry observability.
//!
//! All counters use relaxed ordering -- they are advisory/diagnostic, not
//! synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

/// Registry operation counters.
pub struct TrackMetrics {
    /// Successful allocations registered (all families).
    pub allocations: AtomicU64,
    /// Successful releases (platform free performed).
    pub releases: AtomicU64,
    /// Successful resizes (in place or relocating).
    pub resizes: AtomicU64,
    /// Double releases reported (diagnostic mode).
    pub double_release_reports: AtomicU64,
    /// Releases or resizes of addresses the registry never tracked.
    pub foreign_reports: AtomicU64,
    /// Operations that failed validation or platform allocation.
    pub failed_operations: AtomicU64,
    /// Entries reported as leaks by the exit audit.
    pub leaked_at_audit: AtomicU64,
}

impl TrackMetrics {
    /// A zeroed counter set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            resizes: AtomicU64::new(0),
            double_release_reports: AtomicU64::new(0),
            foreign_reports: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
            leaked_at_audit: AtomicU64::new(0),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// A point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            resizes: self.resizes.load(Ordering::Relaxed),
            double_release_reports: self.double_release_reports.load(Ordering::Relaxed),
            foreign_reports: self.foreign_reports.load(Ordering::Relaxed),
            failed_operations: self.failed_operations.load(Ordering::Relaxed),
            leaked_at_audit: self.leaked_at_audit.load(Ordering::Relaxed),
        }
    }
}

impl Default for TrackMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of the counters at one moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub allocations: u64,
    pub releases: u64,
    pub resizes: u64,
    pub double_release_reports: u64,
    pub foreign_reports: u64,
    pub failed_operations: u64,
    pub leaked_at_audit: u64,
}
