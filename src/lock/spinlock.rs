use crate::error::{MutexError, Result};
use crate::lock::clock::{Clock, SystemClock};
use crate::lock::retry::{Backoff, RetryLoop};
use crate::store::LeaseStore;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Prefix that keeps lock keys apart from unrelated keys in a shared store
pub const KEY_PREFIX: &str = "lock_";

/// Namespaced store key for a lock name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(MutexError::InvalidName);
        }
        Ok(LockKey(format!("{}{}", KEY_PREFIX, name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Polling lock over a [`LeaseStore`].
///
/// The lease is requested for `timeout + 1s`, one second longer than the
/// retry deadline and the allowed execution time. On release the elapsed time
/// is checked first: once it exceeds `timeout` the lease may already belong
/// to somebody else, so nothing is deleted.
#[derive(Debug)]
pub struct SpinlockStrategy {
    key: LockKey,
    timeout: Duration,
    lease_ttl: Duration,
    retry: RetryLoop,
    store: Arc<dyn LeaseStore>,
    clock: Arc<dyn Clock>,
    acquired_at: Option<Instant>,
}

impl SpinlockStrategy {
    pub fn new(name: &str, timeout_secs: u64, store: Arc<dyn LeaseStore>) -> Result<Self> {
        if timeout_secs == 0 {
            return Err(MutexError::InvalidTimeout {
                timeout: timeout_secs,
            });
        }

        let key = LockKey::new(name)?;
        let timeout = Duration::from_secs(timeout_secs);
        let lease_ttl = timeout
            .checked_add(Duration::from_secs(1))
            .ok_or(MutexError::InvalidTimeout {
                timeout: timeout_secs,
            })?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Ok(Self {
            key,
            timeout,
            lease_ttl,
            retry: RetryLoop::new(timeout)?.with_clock(clock.clone()),
            store,
            clock,
            acquired_at: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.retry = self.retry.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.retry = self.retry.with_backoff(backoff);
        self
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// TTL requested from the store for every lease
    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired_at.is_some()
    }

    /// Spin until the lease is created or the timeout elapses
    pub fn lock(&mut self) -> Result<()> {
        debug!("Acquiring lock: {} (timeout: {:?})", self.key, self.timeout);

        let ttl = self.lease_ttl();
        let key = &self.key;
        let store = &self.store;
        let clock = &self.clock;

        let acquired_at = self.retry.execute(key.as_str(), || {
            let candidate = clock.now();
            match store.try_create(key.as_str(), ttl) {
                Ok(true) => Ok(ControlFlow::Break(candidate)),
                Ok(false) => Ok(ControlFlow::Continue(())),
                Err(e) => Err(MutexError::LockAcquire {
                    key: key.to_string(),
                    source: e,
                }),
            }
        })?;

        self.acquired_at = Some(acquired_at);
        debug!("Lock acquired: {}", self.key);
        Ok(())
    }

    /// Delete the lease, unless the protected code ran past the timeout
    pub fn unlock(&mut self) -> Result<()> {
        let acquired_at = self.acquired_at.take().ok_or_else(|| MutexError::NotAcquired {
            key: self.key.to_string(),
        })?;

        let elapsed = self.clock.now().saturating_duration_since(acquired_at);
        if elapsed > self.timeout {
            return Err(MutexError::ExecutionOutsideLock {
                key: self.key.to_string(),
                elapsed,
                timeout: self.timeout,
            });
        }

        // At worst one second is left before the lease expires, so the key
        // deleted here is still ours.
        match self.store.try_delete(self.key.as_str()) {
            Ok(true) => {
                debug!("Lock released: {} (held {:?})", self.key, elapsed);
                Ok(())
            }
            Ok(false) => Err(MutexError::LockRelease {
                key: self.key.to_string(),
                source: None,
            }),
            Err(e) => Err(MutexError::LockRelease {
                key: self.key.to_string(),
                source: Some(e),
            }),
        }
    }
}
