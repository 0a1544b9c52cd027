//! Consecutive-failure circuit breaker.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before admitting a trial.
    pub open_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Shared breaker guarding one downstream dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask permission to call the dependency.
    ///
    /// An open circuit whose cool-down has elapsed moves to half-open and
    /// admits exactly one trial call; everything else waits for its outcome.
    /// The returned permit must be settled with [`Permit::success`] or
    /// [`Permit::failure`]; a trial permit dropped unsettled re-opens the
    /// circuit.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.inner.lock();
        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|opened| opened.elapsed() >= self.config.open_duration);
                if !cooled_down {
                    return None;
                }
                tracing::info!(breaker = %self.name, "circuit half-open, admitting trial call");
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return None;
                }
                inner.trial_in_flight = true;
                true
            }
        };

        Some(Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(breaker = %self.name, "circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.trial_in_flight = false;

        let trip = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };

        if trip {
            tracing::warn!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                "circuit opened"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}

/// Admission to call the guarded dependency once.
#[derive(Debug)]
#[must_use = "an unsettled trial permit re-opens the circuit"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.settled || !self.trial {
            return;
        }
        tracing::warn!(breaker = %self.breaker.name, "trial call abandoned, re-opening circuit");
        self.breaker.record_failure();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, open_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: threshold,
                open_duration: Duration::from_millis(open_ms),
            },
        )
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = breaker(3, 60_000);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_some());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = breaker(2, 60_000);
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_admits_single_trial() {
        let breaker = breaker(1, 10);
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        let trial = breaker.try_acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_none());

        trial.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        let permit = breaker.try_acquire().unwrap();
        assert!(!permit.is_trial());
    }

    #[test]
    fn failed_trial_reopens() {
        let breaker = breaker(1, 10);
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        breaker.try_acquire().unwrap().failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[test]
    fn abandoned_trial_reopens_instead_of_wedging() {
        let breaker = breaker(1, 10);
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));
        let trial = breaker.try_acquire().unwrap();
        assert!(trial.is_trial());
        trial.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn dropped_closed_permit_changes_nothing() {
        let breaker = breaker(1, 60_000);
        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
