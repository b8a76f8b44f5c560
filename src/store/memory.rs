use crate::error::{StoreError, StoreResult};
use crate::lock::{Clock, SystemClock};
use crate::store::LeaseStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// In-process lease store.
///
/// Leases live in a map of key to expiry instant, checked against the store's
/// clock. Only useful when every contender shares the same process.
#[derive(Debug)]
pub struct MemoryLeaseStore {
    leases: Mutex<HashMap<String, Instant>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Whether `key` currently holds a live lease
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.leases
            .lock()
            .map(|leases| leases.get(key).is_some_and(|expiry| *expiry > now))
            .unwrap_or(false)
    }

    /// Number of live leases
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.leases
            .lock()
            .map(|leases| leases.values().filter(|expiry| **expiry > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaseStore for MemoryLeaseStore {
    fn try_create(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = self.clock.now();
        let expiry = now
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Other(format!("Lease TTL out of range: {:?}", ttl)))?;
        let mut leases = self.leases.lock().map_err(|_| StoreError::Poisoned)?;

        match leases.get(key) {
            Some(current) if *current > now => Ok(false),
            Some(_) => {
                debug!("Replacing expired lease: {}", key);
                leases.insert(key.to_string(), expiry);
                Ok(true)
            }
            None => {
                leases.insert(key.to_string(), expiry);
                Ok(true)
            }
        }
    }

    fn try_delete(&self, key: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut leases = self.leases.lock().map_err(|_| StoreError::Poisoned)?;

        match leases.remove(key) {
            Some(expiry) => Ok(expiry > now),
            None => Ok(false),
        }
    }
}
