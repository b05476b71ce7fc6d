//! Runtime worker state, owned by the Supervisor and mutated only under a
//! per-worker critical section.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::breaker::CircuitBreaker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Busy,
    Error,
    Offline,
}

/// EMA smoothing factor for success rate and processing-time tracking.
const EMA_ALPHA: f64 = 0.2;

pub struct WorkerState {
    pub id: String,
    in_flight: AtomicU32,
    consecutive_failures: AtomicU32,
    success_rate_bits: AtomicI64,
    avg_processing_ms_bits: AtomicI64,
    pub breaker: CircuitBreaker,
}

impl WorkerState {
    pub fn new(id: impl Into<String>, breaker_threshold: u32, breaker_timeout: Duration) -> Self {
        Self {
            id: id.into(),
            in_flight: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
            success_rate_bits: AtomicI64::new(1.0f64.to_bits() as i64),
            avg_processing_ms_bits: AtomicI64::new(0i64),
            breaker: CircuitBreaker::new(breaker_threshold, breaker_timeout),
        }
    }

    pub fn status(&self) -> WorkerStatus {
        if self.breaker.state() == super::breaker::CircuitState::Open {
            return WorkerStatus::Offline;
        }
        if self.consecutive_failures.load(Ordering::SeqCst) > 0 {
            return WorkerStatus::Error;
        }
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return WorkerStatus::Busy;
        }
        WorkerStatus::Idle
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn success_rate(&self) -> f64 {
        f64::from_bits(self.success_rate_bits.load(Ordering::SeqCst) as u64)
    }

    pub fn avg_processing_time(&self) -> Duration {
        Duration::from_millis(self.avg_processing_ms_bits.load(Ordering::SeqCst).max(0) as u64)
    }

    pub fn begin_call(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_call(&self, success: bool, elapsed: Duration) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if success {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            self.breaker.record_success();
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
            self.breaker.record_failure();
        }

        let observed = if success { 1.0 } else { 0.0 };
        let prev = self.success_rate();
        let next = EMA_ALPHA * observed + (1.0 - EMA_ALPHA) * prev;
        self.success_rate_bits
            .store(next.to_bits() as i64, Ordering::SeqCst);

        let prev_ms = self.avg_processing_time().as_millis() as f64;
        let observed_ms = elapsed.as_millis() as f64;
        let next_ms = EMA_ALPHA * observed_ms + (1.0 - EMA_ALPHA) * prev_ms;
        self.avg_processing_ms_bits
            .store(next_ms as i64, Ordering::SeqCst);
    }

    /// Weight used by weighted/performance-based selection:
    /// `success_rate / max(avg_processing_time, epsilon)`.
    pub fn selection_weight(&self) -> f64 {
        let epsilon_ms = 1.0;
        let avg_ms = (self.avg_processing_time().as_millis() as f64).max(epsilon_ms);
        self.success_rate() / avg_ms
    }
}

/// Round-robin cursor, one per capability, shared across calls.
pub struct RoundRobinCursor(Mutex<usize>);

impl Default for RoundRobinCursor {
    fn default() -> Self {
        Self(Mutex::new(0))
    }
}

impl RoundRobinCursor {
    pub fn next(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let mut cursor = self.0.lock();
        let idx = *cursor % len;
        *cursor = (*cursor + 1) % len;
        idx
    }
}
