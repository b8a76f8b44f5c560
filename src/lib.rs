//! Run work under a mutual-exclusion lock whose lease lives in an external store

pub mod error;
pub mod housekeep;
pub mod lock;
pub mod store;
pub mod utils;

pub use error::{MutexError, Result, StoreError, SyncError};
pub use lock::{Backoff, Clock, ManualClock, Mutex, MutexStrategy, SpinlockStrategy, SystemClock};
pub use store::{FileLeaseStore, LeaseStore, MemoryLeaseStore, GUARD_EXTENSION, LEASE_EXTENSION};
