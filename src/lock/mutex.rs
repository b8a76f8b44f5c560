use crate::error::{Result, SyncError};
use crate::lock::spinlock::SpinlockStrategy;
use crate::store::LeaseStore;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// How a [`Mutex`] coordinates with other processes.
#[derive(Debug)]
pub enum MutexStrategy {
    /// No coordination at all. Not safe across processes; use it only where
    /// the caller is known to be alone.
    Noop,
    /// Lease held in an external store, acquired by polling
    Spinlock(SpinlockStrategy),
}

impl MutexStrategy {
    fn acquire(&mut self) -> Result<()> {
        match self {
            MutexStrategy::Noop => Ok(()),
            MutexStrategy::Spinlock(spinlock) => spinlock.lock(),
        }
    }

    fn release(&mut self) -> Result<()> {
        match self {
            MutexStrategy::Noop => Ok(()),
            MutexStrategy::Spinlock(spinlock) => spinlock.unlock(),
        }
    }
}

/// Runs work exclusively under the configured strategy.
///
/// `synchronized` takes `&mut self`, so one instance never has two
/// acquisitions in flight. Contenders use one `Mutex` each.
#[derive(Debug)]
pub struct Mutex {
    strategy: MutexStrategy,
}

impl Mutex {
    pub fn new(strategy: MutexStrategy) -> Self {
        Self { strategy }
    }

    pub fn noop() -> Self {
        Self::new(MutexStrategy::Noop)
    }

    pub fn spinlock(name: &str, timeout_secs: u64, store: Arc<dyn LeaseStore>) -> Result<Self> {
        Ok(SpinlockStrategy::new(name, timeout_secs, store)?.into())
    }

    pub fn strategy(&self) -> &MutexStrategy {
        &self.strategy
    }

    /// Acquire the lock, run `work`, release the lock.
    ///
    /// Work never runs without the lock. Release is attempted on every exit
    /// from `work`, including a panic, which is resumed afterwards. When both
    /// `work` and the release fail, the work error is returned with the
    /// release error attached.
    pub fn synchronized<T, E, F>(&mut self, work: F) -> std::result::Result<T, SyncError<E>>
    where
        F: FnOnce() -> std::result::Result<T, E>,
    {
        self.strategy.acquire()?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(work));
        let released = self.strategy.release();

        match outcome {
            Ok(Ok(value)) => {
                released?;
                Ok(value)
            }
            Ok(Err(source)) => {
                let release = released.err();
                if let Some(e) = &release {
                    warn!("Lock release failed after work error: {}", e);
                }
                Err(SyncError::Work { source, release })
            }
            Err(payload) => {
                match released {
                    Ok(()) => debug!("Lock released after panic in synchronized work"),
                    Err(e) => warn!("Lock release failed after panic in synchronized work: {}", e),
                }
                panic::resume_unwind(payload)
            }
        }
    }
}

impl From<SpinlockStrategy> for Mutex {
    fn from(spinlock: SpinlockStrategy) -> Self {
        Self::new(MutexStrategy::Spinlock(spinlock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MutexError;
    use crate::store::MemoryLeaseStore;

    #[test]
    fn test_noop_runs_work() {
        let mut mutex = Mutex::noop();
        let result: std::result::Result<_, SyncError<MutexError>> = mutex.synchronized(|| Ok(7));
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_noop_passes_work_error_through() {
        let mut mutex = Mutex::noop();
        let result: std::result::Result<(), _> = mutex.synchronized(|| Err("bad input"));

        match result {
            Err(SyncError::Work { source, release }) => {
                assert_eq!(source, "bad input");
                assert!(release.is_none());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_panic_still_releases() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut mutex = Mutex::spinlock("panicky", 5, store.clone()).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = mutex.synchronized::<(), MutexError, _>(|| panic!("work exploded"));
        }));

        assert!(result.is_err());
        assert!(store.is_empty());
    }
}
