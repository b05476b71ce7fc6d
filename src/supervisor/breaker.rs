//! Per-worker circuit breaker: closed -> open -> half-open -> closed.
//!
//! Grounded on the teacher's `resilience::circuit_breaker` pattern, adapted
//! to the per-worker state machine of spec.md §4.2 (separate success
//! threshold of one: half-open admits a single probe, not N).

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker guarding a single worker (or, at the orchestrator level,
/// the whole pipeline).
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    consecutive_failures: AtomicU32,
    state: Mutex<CircuitState>,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold,
            timeout,
            consecutive_failures: AtomicU32::new(0),
            state: Mutex::new(CircuitState::Closed),
            opened_at: Mutex::new(None),
        }
    }

    /// Whether a call is currently admitted. Open -> HalfOpen transition on
    /// timeout elapsed happens here, as a side effect of the check.
    pub fn admit(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened_at = *self.opened_at.lock();
                if opened_at.is_some_and(|t| t.elapsed() >= self.timeout) {
                    *state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let mut state = self.state.lock();
        if *state == CircuitState::HalfOpen {
            *state = CircuitState::Closed;
            *self.opened_at.lock() = None;
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        if *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.opened_at.lock() = Some(Instant::now());
            self.consecutive_failures.store(self.threshold, Ordering::SeqCst);
            return;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.threshold {
            *state = CircuitState::Open;
            *self.opened_at.lock() = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_open_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(breaker.admit());
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.admit());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.admit());
    }

    #[test]
    fn half_open_closes_on_first_success_reopens_on_failure() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.admit());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.admit());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
