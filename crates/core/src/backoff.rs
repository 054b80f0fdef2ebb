//! Bounded retry on rate-limit signals.
//!
//! Only rate limiting is retried. Every other outcome, success or failure, is
//! returned from the first attempt that produces it.

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts including the first one. Always >= 1.
    pub max_attempts: u32,
    /// Wait used when the server gives no hint; doubles per attempt.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl BackoffPolicy {
    /// Wait before the retry that follows attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.max_delay);
        }
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent).min(self.max_delay)
    }
}

/// Call-scoped retry bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub last_wait_hint: Option<Duration>,
}

/// Outcome of one attempt.
pub enum Attempt<T> {
    Done(T),
    /// Rejected for rate limiting, with the server's wait hint if any.
    RateLimited(Option<Duration>),
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Run `op` until it completes, fails, or exhausts `policy.max_attempts`
/// rate-limited attempts.
pub fn with_backoff<T>(
    policy: &BackoffPolicy,
    sleeper: &dyn Sleeper,
    mut op: impl FnMut(&RetryState) -> Result<Attempt<T>>,
) -> Result<T> {
    let max_attempts = policy.max_attempts.max(1);
    let mut state = RetryState::default();
    loop {
        state.attempt += 1;
        match op(&state)? {
            Attempt::Done(value) => return Ok(value),
            Attempt::RateLimited(hint) => {
                state.last_wait_hint = hint;
                if state.attempt >= max_attempts {
                    warn!(attempts = state.attempt, "Rate limit retries exhausted");
                    return Err(Error::RateLimited {
                        attempts: state.attempt,
                        retry_after_ms: hint.map(|h| h.as_millis() as u64),
                    });
                }
                let wait = policy.delay(state.attempt, hint);
                warn!(
                    attempt = state.attempt,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limited, backing off"
                );
                sleeper.sleep(wait);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSleeper;

    #[test]
    fn delay_prefers_hint_and_caps() {
        let p = BackoffPolicy::default();
        assert_eq!(p.delay(1, Some(Duration::from_millis(10))), Duration::from_millis(10));
        assert_eq!(p.delay(1, Some(Duration::from_secs(600))), p.max_delay);
        assert_eq!(p.delay(1, None), Duration::from_millis(1000));
        assert_eq!(p.delay(2, None), Duration::from_millis(2000));
        assert_eq!(p.delay(3, None), Duration::from_millis(4000));
        assert_eq!(p.delay(40, None), p.max_delay);
    }

    #[test]
    fn retries_then_succeeds() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let out = with_backoff(&BackoffPolicy::default(), &sleeper, |state| {
            calls += 1;
            assert_eq!(state.attempt, calls);
            if calls == 1 {
                Ok(Attempt::RateLimited(Some(Duration::from_millis(10))))
            } else {
                Ok(Attempt::Done("ok"))
            }
        })
        .unwrap();
        assert_eq!(out, "ok");
        assert_eq!(calls, 2);
        assert_eq!(sleeper.waits(), vec![Duration::from_millis(10)]);
    }

    #[test]
    fn exhaustion_is_a_rate_limit_error() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let err = with_backoff::<()>(&BackoffPolicy::default(), &sleeper, |_| {
            calls += 1;
            Ok(Attempt::RateLimited(None))
        })
        .unwrap_err();
        assert_eq!(calls, 3);
        assert!(matches!(err, Error::RateLimited { attempts: 3, retry_after_ms: None }));
        assert_eq!(err.code(), "RATE_LIMIT");
        // Sleeps between attempts only, never after the last one.
        assert_eq!(sleeper.waits(), vec![Duration::from_millis(1000), Duration::from_millis(2000)]);
    }

    #[test]
    fn errors_are_not_retried() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let err = with_backoff::<()>(&BackoffPolicy::default(), &sleeper, |_| {
            calls += 1;
            Err(Error::validation("nope"))
        })
        .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(calls, 1);
        assert!(sleeper.waits().is_empty());
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let policy = BackoffPolicy { max_attempts: 0, ..BackoffPolicy::default() };
        let out = with_backoff(&policy, &RecordingSleeper::default(), |_| Ok(Attempt::Done(1)));
        assert_eq!(out.unwrap(), 1);
    }
}
