//! Backing stores that hold spinlock leases

mod file;
mod memory;

pub(crate) use file::read_expiry;
pub use file::{default_lease_dir, lease_file_name, FileLeaseStore, GUARD_EXTENSION, LEASE_EXTENSION};
pub use memory::MemoryLeaseStore;

use crate::error::StoreResult;
use std::fmt;
use std::time::Duration;

/// The two atomic primitives a spinlock needs from a key-value store.
pub trait LeaseStore: Send + Sync + fmt::Debug {
    /// Create `key` with the given time-to-live unless a live lease already
    /// exists. Two concurrent callers must never both get `true`.
    fn try_create(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remove `key` if a live lease exists. `false` means there was nothing
    /// to remove, which is not an error at this level.
    fn try_delete(&self, key: &str) -> StoreResult<bool>;
}
