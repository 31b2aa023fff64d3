use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::StateStoreError;

/// Consecutive failures before the circuit opens.
const FAILURE_THRESHOLD: u32 = 5;
/// How long an open circuit stays closed to traffic before a probe.
const OPEN_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-target circuit breaker.
///
/// Closed → Open after [`FAILURE_THRESHOLD`] consecutive failures; Open →
/// HalfOpen after [`OPEN_DURATION`]; one probe request decides between
/// Closed (success) and Open again (failure).
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: u32,
    open_for: Duration,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_limits(FAILURE_THRESHOLD, OPEN_DURATION)
    }

    pub fn with_limits(threshold: u32, open_for: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            threshold,
            open_for,
        }
    }

    /// Gate a request. `Err(CircuitOpen)` means the call must not be made.
    pub fn check(&self) -> Result<(), StateStoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.open_for {
                    info!("circuit breaker half-open, allowing probe request");
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(StateStoreError::CircuitOpen {
                        retry_after_secs: (self.open_for - elapsed).as_secs().max(1),
                    })
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != BreakerState::Closed {
            info!("circuit breaker closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::HalfOpen => {
                warn!("circuit breaker re-opened: probe request failed");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.threshold {
                    warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::Open => {}
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::with_limits(3, Duration::from_secs(60));
        for _ in 0..2 {
            breaker.record_failure();
            assert!(breaker.check().is_ok());
        }
        breaker.record_failure();
        assert!(matches!(
            breaker.check(),
            Err(StateStoreError::CircuitOpen { .. })
        ));
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::with_limits(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.check().is_ok(), "count must restart after success");
    }

    #[test]
    fn half_open_probe_closes_on_success() {
        let breaker = CircuitBreaker::with_limits(1, Duration::ZERO);
        breaker.record_failure();
        // OPEN, but the window is zero so the next check transitions to half-open.
        assert!(breaker.check().is_ok());
        breaker.record_success();
        assert!(breaker.check().is_ok());
    }

    #[test]
    fn half_open_probe_reopens_on_failure() {
        let breaker = CircuitBreaker::with_limits(1, Duration::from_secs(60));
        breaker.record_failure();
        assert!(breaker.check().is_err());

        let breaker = CircuitBreaker::with_limits(1, Duration::ZERO);
        breaker.record_failure();
        assert!(breaker.check().is_ok()); // half-open probe allowed
        breaker.record_failure();
        // Zero open window: the follow-up check is another probe, not a
        // closed-circuit pass.
        assert!(breaker.check().is_ok());
    }
}
