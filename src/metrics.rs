// Metrics tracking for commit operations
// Thread-local storage: managers run synchronously inside one request thread
thread_local! {
    static METRICS: std::cell::RefCell<CommitMetrics> = const { std::cell::RefCell::new(CommitMetrics::new_const()) };
}

/// Counters for the current thread
#[derive(Debug, Default, Clone)]
struct CommitMetrics {
    /// Events accepted by `commit` (sent or queued)
    committed: u64,
    /// Commits skipped because of a lock
    suppressed: u64,
    /// Commits refused by validation
    rejected: u64,
    /// Events appended to the waiting queue
    queued: u64,
    /// Events discarded because their fingerprint was already queued
    coalesced: u64,
    /// Successful deliveries (immediate and drained)
    delivered: u64,
    /// Failed delivery attempts
    failed: u64,
    /// Events dropped as obsolete
    dropped: u64,
    /// Number of drain passes
    drains: u64,
    /// Total time spent draining (nanoseconds)
    total_drain_ns: u128,
}

impl CommitMetrics {
    const fn new_const() -> Self {
        Self {
            committed: 0,
            suppressed: 0,
            rejected: 0,
            queued: 0,
            coalesced: 0,
            delivered: 0,
            failed: 0,
            dropped: 0,
            drains: 0,
            total_drain_ns: 0,
        }
    }
}

/// Public interface for metrics tracking
pub mod metrics_api {
    use super::*;

    pub fn record_committed() {
        METRICS.with(|m| m.borrow_mut().committed += 1);
    }

    pub fn record_suppressed() {
        METRICS.with(|m| m.borrow_mut().suppressed += 1);
    }

    pub fn record_rejected() {
        METRICS.with(|m| m.borrow_mut().rejected += 1);
    }

    pub fn record_queued() {
        METRICS.with(|m| m.borrow_mut().queued += 1);
    }

    pub fn record_coalesced() {
        METRICS.with(|m| m.borrow_mut().coalesced += 1);
    }

    pub fn record_delivery(success: bool) {
        METRICS.with(|m| {
            let mut metrics = m.borrow_mut();
            if success {
                metrics.delivered += 1;
            } else {
                metrics.failed += 1;
            }
        });
    }

    pub fn record_dropped() {
        METRICS.with(|m| m.borrow_mut().dropped += 1);
    }

    /// Record the start of a drain pass
    pub fn record_drain_start() -> DrainTimer {
        DrainTimer::new()
    }

    pub fn record_drain_complete(timer: DrainTimer) {
        METRICS.with(|m| {
            let mut metrics = m.borrow_mut();
            metrics.drains += 1;
            metrics.total_drain_ns += timer.elapsed_ns();
        });
    }

    /// Snapshot of the counters, with the caller's current queue size
    pub fn get_stats(queue_size: usize) -> CommitStats {
        METRICS.with(|m| {
            let metrics = m.borrow();
            CommitStats {
                queue_size,
                committed: metrics.committed,
                suppressed: metrics.suppressed,
                rejected: metrics.rejected,
                queued: metrics.queued,
                coalesced: metrics.coalesced,
                delivered: metrics.delivered,
                failed: metrics.failed,
                dropped: metrics.dropped,
                drains: metrics.drains,
                total_drain_ns: metrics.total_drain_ns,
            }
        })
    }

    pub fn reset_metrics() {
        METRICS.with(|m| {
            *m.borrow_mut() = CommitMetrics::default();
        });
    }
}

/// Timer for measuring drain duration
pub struct DrainTimer {
    start: std::time::Instant,
}

impl DrainTimer {
    fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    fn elapsed_ns(&self) -> u128 {
        self.start.elapsed().as_nanos()
    }
}

/// Statistics returned by metrics functions
#[derive(Debug, Clone, PartialEq)]
pub struct CommitStats {
    pub queue_size: usize,
    pub committed: u64,
    pub suppressed: u64,
    pub rejected: u64,
    pub queued: u64,
    pub coalesced: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub drains: u64,
    pub total_drain_ns: u128,
}

impl CommitStats {
    /// Convert timing to milliseconds
    pub fn total_drain_ms(&self) -> f64 {
        self.total_drain_ns as f64 / 1_000_000.0
    }

    /// Share of delivery attempts that succeeded
    pub fn delivery_success_rate(&self) -> f64 {
        let total = self.delivered + self.failed;
        if total == 0 {
            0.0
        } else {
            self.delivered as f64 / total as f64
        }
    }

    /// Share of queue insertions that were coalesced into an existing entry
    pub fn coalesce_rate(&self) -> f64 {
        let total = self.queued + self.coalesced;
        if total == 0 {
            0.0
        } else {
            self.coalesced as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::metrics_api::*;

    #[test]
    fn test_counters_and_rates() {
        reset_metrics();

        record_delivery(true);
        record_delivery(true);
        record_delivery(false);
        record_queued();
        record_coalesced();
        record_suppressed();

        let stats = get_stats(4);
        assert_eq!(stats.queue_size, 4);
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.suppressed, 1);
        assert!((stats.delivery_success_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
        assert!((stats.coalesce_rate() - 0.5).abs() < f64::EPSILON);

        reset_metrics();
        let stats = get_stats(0);
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.delivery_success_rate(), 0.0);
    }

    #[test]
    fn test_drain_timer() {
        reset_metrics();
        let timer = record_drain_start();
        record_drain_complete(timer);
        assert_eq!(get_stats(0).drains, 1);
    }
}
