mod types;

pub use types::{MutexError, Result, StoreError, StoreResult, SyncError};

// Re-export for convenience
pub use MutexError as Error;
