use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures raised by a [`LeaseStore`](crate::store::LeaseStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Lease store I/O failed on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Invalid lease record {path}: {message}")]
    InvalidLease { path: PathBuf, message: String },

    #[error("Refusing to follow symlinked lease file: {path}")]
    SymlinkNotAllowed { path: PathBuf },

    #[error("Lease store state is poisoned")]
    Poisoned,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum MutexError {
    #[error("Invalid timeout {timeout}s: the timeout must be greater than 0 and fit in a deadline")]
    InvalidTimeout { timeout: u64 },

    #[error("Invalid lock name: the name must not be empty")]
    InvalidName,

    #[error("Failed to acquire lock {key}: timeout after {timeout:?}")]
    LockAcquireTimeout { key: String, timeout: Duration },

    #[error("Failed to acquire lock {key}: {source}")]
    LockAcquire { key: String, source: StoreError },

    #[error(
        "Execution of the protected code for {key} exceeded the lock timeout: \
         {elapsed:?} elapsed, timeout was {timeout:?}"
    )]
    ExecutionOutsideLock {
        key: String,
        elapsed: Duration,
        timeout: Duration,
    },

    #[error("Failed to release lock {key}{}", release_detail(.source))]
    LockRelease {
        key: String,
        #[source]
        source: Option<StoreError>,
    },

    #[error("Cannot release lock {key}: it was never acquired")]
    NotAcquired { key: String },

    #[error("Invalid duration format '{input}': {message}")]
    InvalidDuration { input: String, message: String },

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to create lease directory {path}: {source}")]
    LeaseDirectoryFailed { path: PathBuf, source: io::Error },

    #[error("Failed to read from {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    #[error("Failed to run command '{command}': {source}")]
    CommandFailed { command: String, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

fn release_detail(source: &Option<StoreError>) -> String {
    match source {
        Some(e) => format!(": {}", e),
        None => ": the lease was no longer present".to_string(),
    }
}

impl MutexError {
    pub fn exit_code(&self) -> i32 {
        match self {
            MutexError::LockAcquireTimeout { .. } => 2,
            MutexError::ExecutionOutsideLock { .. } => 4,
            MutexError::Io(e) if e.kind() == io::ErrorKind::Interrupted => 3,
            _ => 1,
        }
    }

    /// Whether re-invoking `synchronized` may succeed without any change
    pub fn is_retryable(&self) -> bool {
        matches!(self, MutexError::LockAcquireTimeout { .. })
    }

    pub fn lock_acquire_timeout(key: impl Into<String>, timeout: Duration) -> Self {
        MutexError::LockAcquireTimeout {
            key: key.into(),
            timeout,
        }
    }
}

/// Outcome of a failed [`Mutex::synchronized`](crate::Mutex::synchronized) call.
///
/// A failing release never hides a failing work callback: both are carried by
/// [`SyncError::Work`].
#[derive(Debug, Error)]
pub enum SyncError<E> {
    #[error(transparent)]
    Lock(MutexError),

    #[error("Synchronized work failed: {source}")]
    Work {
        #[source]
        source: E,
        release: Option<MutexError>,
    },
}

impl<E> SyncError<E> {
    /// The lock error, if the failure came from acquiring or releasing
    pub fn lock_error(&self) -> Option<&MutexError> {
        match self {
            SyncError::Lock(e) => Some(e),
            SyncError::Work { release, .. } => release.as_ref(),
        }
    }

    /// The error returned by the work callback, if it failed
    pub fn work_error(&self) -> Option<&E> {
        match self {
            SyncError::Lock(_) => None,
            SyncError::Work { source, .. } => Some(source),
        }
    }

    pub fn into_work_error(self) -> Option<E> {
        match self {
            SyncError::Lock(_) => None,
            SyncError::Work { source, .. } => Some(source),
        }
    }
}

impl<E> From<MutexError> for SyncError<E> {
    fn from(e: MutexError) -> Self {
        SyncError::Lock(e)
    }
}

pub type Result<T> = std::result::Result<T, MutexError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
