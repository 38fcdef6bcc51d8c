use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use super::repository::{Clock, NotificationPublisher, NotifyError, ReputationNotice};

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { failures: u32 },
    Open { since: DateTime<Utc> },
    HalfOpen,
}

#[derive(Debug, thiserror::Error)]
pub enum BreakerError {
    #[error("circuit breaker open")]
    Open,
}

/// Closed/open/half-open breaker around an outbound collaborator. Trips after
/// `failure_threshold` consecutive failures, refuses calls while open, and
/// lets a single probe through once `recovery` has elapsed.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery,
            clock,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
        }
    }

    /// Gate a call. Transitions open → half-open when the recovery window has
    /// elapsed.
    pub fn check(&self) -> Result<(), BreakerError> {
        let mut state = self.lock_state();
        match *state {
            BreakerState::Closed { .. } | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open { since } => {
                if self.clock.now().signed_duration_since(since) >= self.recovery {
                    *state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(BreakerError::Open)
                }
            }
        }
    }

    pub fn record_success(&self) {
        *self.lock_state() = BreakerState::Closed { failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = self.lock_state();
        *state = match *state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.failure_threshold {
                    BreakerState::Open {
                        since: self.clock.now(),
                    }
                } else {
                    BreakerState::Closed { failures }
                }
            }
            // A failed probe re-opens the window.
            BreakerState::HalfOpen | BreakerState::Open { .. } => BreakerState::Open {
                since: self.clock.now(),
            },
        };
    }

    pub fn state_label(&self) -> &'static str {
        match *self.lock_state() {
            BreakerState::Closed { .. } => "closed",
            BreakerState::Open { .. } => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Notification publisher decorated with a circuit breaker so a sustained
/// notification outage cannot cascade into the event workers.
pub struct GuardedNotifications {
    inner: Arc<dyn NotificationPublisher>,
    breaker: CircuitBreaker,
}

impl GuardedNotifications {
    pub fn new(inner: Arc<dyn NotificationPublisher>, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker_state(&self) -> &'static str {
        self.breaker.state_label()
    }
}

impl NotificationPublisher for GuardedNotifications {
    fn publish(&self, notice: ReputationNotice) -> Result<(), NotifyError> {
        if self.breaker.check().is_err() {
            warn!(
                kind = notice.kind.label(),
                user = %notice.user_id.0,
                "notification dropped while breaker open"
            );
            return Err(NotifyError::Refused);
        }

        match self.inner.publish(notice) {
            Ok(()) => {
                self.breaker.record_success();
                Ok(())
            }
            Err(err) => {
                self.breaker.record_failure();
                Err(err)
            }
        }
    }
}
