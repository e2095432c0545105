//! Shared run counters for the /health endpoint.
//! Updated by the settlement runner and DbWriter.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// Markets handed to the orchestrator or worker pool.
    pub markets_processed: AtomicU64,
    /// Result rows committed by the writer.
    pub results_written: AtomicU64,
    /// Results queued for the writer but not yet committed.
    pub write_queue_pending: AtomicU64,
    /// Millisecond timestamp of the last completed run (0 = none).
    pub last_run_at_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthCounters {
    pub markets_processed: u64,
    pub results_written: u64,
    pub write_queue_pending: u64,
    pub last_run_at_ms: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_markets_processed(&self, n: u64) {
        self.markets_processed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_results_written(&self, n: u64) {
        self.results_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_write_queue_pending(&self) {
        self.write_queue_pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_write_queue_pending(&self, n: u64) {
        let _ = self
            .write_queue_pending
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(n)));
    }

    pub fn set_last_run_at_ms(&self, ms: u64) {
        self.last_run_at_ms.store(ms, Ordering::Relaxed);
    }

    pub fn counters(&self) -> HealthCounters {
        HealthCounters {
            markets_processed: self.markets_processed.load(Ordering::Relaxed),
            results_written: self.results_written.load(Ordering::Relaxed),
            write_queue_pending: self.write_queue_pending.load(Ordering::Relaxed),
            last_run_at_ms: self.last_run_at_ms.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_never_underflows() {
        let health = HealthState::new();
        health.inc_write_queue_pending();
        health.dec_write_queue_pending(5);
        assert_eq!(health.counters().write_queue_pending, 0);
        health.add_results_written(3);
        assert_eq!(health.counters().results_written, 3);
    }
}
