use crate::error::{MutexError, Result};
use crate::lock::clock::{Clock, SystemClock};
use rand::Rng;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const MIN_DELAY: Duration = Duration::from_millis(1);

/// Delay schedule between two attempts of a [`RetryLoop`].
///
/// The base delay grows geometrically with the attempt count and is capped at
/// `max_interval`. Jitter is added on top by the loop, not by [`Backoff::delay`].
#[derive(Debug, Clone)]
pub struct Backoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub jitter: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            initial: Duration::from_millis(10),
            multiplier: 1.5,
            max_interval: Duration::from_millis(1000),
            jitter: Duration::from_millis(100),
        }
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Base delay after the given (zero-based) attempt, without jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let millis = self.initial.as_millis() as f64 * factor;
        let max = self.max_interval.max(MIN_DELAY);

        let base = if millis.is_finite() && millis < max.as_millis() as f64 {
            Duration::from_millis(millis as u64)
        } else {
            max
        };

        base.max(MIN_DELAY)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls an attempt callback until it breaks or the deadline passes.
#[derive(Debug, Clone)]
pub struct RetryLoop {
    timeout: Duration,
    backoff: Backoff,
    clock: Arc<dyn Clock>,
}

impl RetryLoop {
    pub fn new(timeout: Duration) -> Result<Self> {
        if timeout.is_zero() || Instant::now().checked_add(timeout).is_none() {
            return Err(MutexError::InvalidTimeout {
                timeout: timeout.as_secs(),
            });
        }

        Ok(Self {
            timeout,
            backoff: Backoff::new(),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `attempt` until it returns `ControlFlow::Break`.
    ///
    /// `key` only names the resource in the timeout error. An `Err` from the
    /// callback ends the loop immediately. The last sleep is clamped to the
    /// deadline, so one final attempt runs at the deadline itself before the
    /// loop gives up.
    pub fn execute<T, F>(&self, key: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Result<ControlFlow<T>>,
    {
        let deadline = self
            .clock
            .now()
            .checked_add(self.timeout)
            .ok_or(MutexError::InvalidTimeout {
                timeout: self.timeout.as_secs(),
            })?;
        let mut rng = rand::thread_rng();
        let mut attempts: u32 = 0;

        loop {
            if let ControlFlow::Break(value) = attempt()? {
                debug!("Retry loop for {} ended after {} attempt(s)", key, attempts + 1);
                return Ok(value);
            }

            let now = self.clock.now();
            if now >= deadline {
                debug!("Retry loop for {} timed out after {} attempt(s)", key, attempts + 1);
                return Err(MutexError::lock_acquire_timeout(key, self.timeout));
            }

            let jitter = if self.backoff.jitter.is_zero() {
                Duration::ZERO
            } else {
                Duration::from_millis(rng.gen_range(0..self.backoff.jitter.as_millis().max(1) as u64))
            };
            let remaining = deadline - now;
            let sleep_time = (self.backoff.delay(attempts) + jitter).min(remaining).max(MIN_DELAY);

            self.clock.sleep(sleep_time);
            attempts = attempts.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::clock::ManualClock;

    fn manual_loop(timeout: Duration) -> (RetryLoop, ManualClock) {
        let clock = ManualClock::new();
        let retry = RetryLoop::new(timeout)
            .unwrap()
            .with_backoff(Backoff::new().with_jitter(Duration::ZERO))
            .with_clock(Arc::new(clock.clone()));
        (retry, clock)
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(matches!(
            RetryLoop::new(Duration::ZERO),
            Err(MutexError::InvalidTimeout { .. })
        ));
    }

    #[test]
    fn test_unrepresentable_deadline_rejected() {
        assert!(matches!(
            RetryLoop::new(Duration::MAX),
            Err(MutexError::InvalidTimeout { .. })
        ));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = Backoff::new();
        assert_eq!(backoff.delay(0), Duration::from_millis(10));
        assert_eq!(backoff.delay(1), Duration::from_millis(15));
        assert_eq!(backoff.delay(2), Duration::from_millis(22));
        assert_eq!(backoff.delay(50), Duration::from_millis(1000));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_never_zero() {
        let backoff = Backoff {
            initial: Duration::ZERO,
            multiplier: 0.0,
            max_interval: Duration::ZERO,
            jitter: Duration::ZERO,
        };
        assert_eq!(backoff.delay(0), MIN_DELAY);
        assert_eq!(backoff.delay(7), MIN_DELAY);
    }

    #[test]
    fn test_break_on_first_attempt_does_not_sleep() {
        let (retry, clock) = manual_loop(Duration::from_secs(1));

        let value = retry.execute("k", || Ok(ControlFlow::Break(42))).unwrap();

        assert_eq!(value, 42);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_break_after_retries() {
        let (retry, clock) = manual_loop(Duration::from_secs(1));
        let mut calls = 0;

        retry
            .execute("k", || {
                calls += 1;
                Ok(if calls == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })
            .unwrap();

        assert_eq!(calls, 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(10), Duration::from_millis(15)]
        );
    }

    #[test]
    fn test_timeout_never_sleeps_past_deadline() {
        let (retry, clock) = manual_loop(Duration::from_secs(2));

        let result = retry.execute::<(), _>("lock_x", || Ok(ControlFlow::Continue(())));

        match result {
            Err(MutexError::LockAcquireTimeout { key, timeout }) => {
                assert_eq!(key, "lock_x");
                assert_eq!(timeout, Duration::from_secs(2));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
        assert!(clock.sleeps().iter().all(|d| !d.is_zero()));
    }

    #[test]
    fn test_callback_error_stops_loop() {
        let (retry, clock) = manual_loop(Duration::from_secs(1));

        let result = retry.execute::<(), _>("k", || Err(MutexError::Other("boom".to_string())));

        assert!(matches!(result, Err(MutexError::Other(_))));
        assert!(clock.sleeps().is_empty());
    }
}
