use crate::error::{MutexError, Result, StoreError, StoreResult};
use crate::store::LeaseStore;
use crate::utils::check_symlink;
use atomic_write_file::AtomicWriteFile;
use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const LEASE_EXTENSION: &str = "lease";
pub const GUARD_EXTENSION: &str = "guard";
const MAX_STEM_LEN: usize = 64;

/// Lease store that keeps one file per key in a shared directory.
///
/// The lease file holds its expiry as an RFC 3339 timestamp. Every
/// check-then-write happens while holding an exclusive `flock` on a sibling
/// guard file, so processes on the same host never both win a key.
///
/// Guard files outlive their leases. `housekeep::clean_leases` removes the
/// ones whose lease is gone and that nobody currently holds.
#[derive(Debug, Clone)]
pub struct FileLeaseStore {
    dir: PathBuf,
}

impl FileLeaseStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();

        if dir.exists() {
            if !dir.is_dir() {
                return Err(MutexError::NotADirectory(dir));
            }
        } else {
            fs::create_dir_all(&dir).map_err(|e| MutexError::LeaseDirectoryFailed {
                path: dir.clone(),
                source: e,
            })?;
        }

        Ok(Self { dir })
    }

    /// Open a store in the platform cache directory
    pub fn open_default() -> Result<Self> {
        Self::new(default_lease_dir()?)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the lease file for `key`
    pub fn lease_path(&self, key: &str) -> PathBuf {
        self.dir.join(lease_file_name(key))
    }

    /// Remove the lease file at `path` if it expired at least `grace` ago.
    ///
    /// Runs under the same guard as create and delete, so a lease reclaimed
    /// concurrently by another process is never removed.
    pub fn remove_if_expired(&self, path: &Path, grace: chrono::Duration) -> StoreResult<bool> {
        self.with_guard(path, |path| {
            let Some(expiry) = read_expiry(path)? else {
                return Ok(false);
            };
            match expiry.checked_add_signed(grace) {
                Some(removable_at) if removable_at <= Utc::now() => {}
                _ => return Ok(false),
            }

            match fs::remove_file(path) {
                Ok(_) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }),
            }
        })
    }

    /// Delete a guard file whose lease no longer exists.
    ///
    /// A guard that is locked right now, or whose lease file is present, is
    /// left alone. The file is unlinked while its flock is held, and
    /// `with_guard` re-checks the path after locking, so a waiter that opened
    /// the old inode retries on a fresh guard.
    pub fn remove_orphaned_guard(&self, guard_path: &Path) -> StoreResult<bool> {
        let io_err = |e: io::Error| StoreError::Io {
            path: guard_path.to_path_buf(),
            source: e,
        };

        let guard = match guard_options(false).open(guard_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(io_err(e)),
        };

        match guard.try_lock_exclusive() {
            Ok(_) => {}
            Err(e) if is_lock_contention(&e) => {
                debug!("Guard in use, skipping: {}", guard_path.display());
                return Ok(false);
            }
            Err(e) => return Err(io_err(e)),
        }

        if !same_file(&guard, guard_path).map_err(io_err)? {
            return Ok(false);
        }

        let lease_path = guard_path.with_extension(LEASE_EXTENSION);
        if lease_path.symlink_metadata().is_ok() {
            return Ok(false);
        }

        match fs::remove_file(guard_path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(e)),
        }
    }

    fn with_guard<T>(
        &self,
        lease_path: &Path,
        f: impl FnOnce(&Path) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let guard_path = lease_path.with_extension(GUARD_EXTENSION);
        let io_err = |e: io::Error| StoreError::Io {
            path: guard_path.clone(),
            source: e,
        };

        let guard: File = loop {
            let guard = guard_options(true).open(&guard_path).map_err(io_err)?;
            guard.lock_exclusive().map_err(io_err)?;

            // Housekeeping may have unlinked the guard while we waited
            if same_file(&guard, &guard_path).map_err(io_err)? {
                break guard;
            }
            debug!("Guard replaced while waiting, retrying: {}", guard_path.display());
        };

        let result = f(lease_path);

        // Closing the handle releases the flock; the guard file persists
        drop(guard);

        result
    }
}

impl LeaseStore for FileLeaseStore {
    fn try_create(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Other(format!("Lease TTL out of range: {}", e)))?;

        self.with_guard(&self.lease_path(key), |path| {
            let now = Utc::now();

            if let Some(expiry) = read_expiry(path)? {
                if expiry > now {
                    return Ok(false);
                }
                debug!("Reclaiming expired lease: {}", path.display());
            }

            let expiry = now
                .checked_add_signed(ttl)
                .ok_or_else(|| StoreError::Other(format!("Lease TTL out of range: {}s", ttl.num_seconds())))?;
            write_expiry(path, expiry)?;
            debug!("Lease created: {} (ttl: {}s)", path.display(), ttl.num_seconds());
            Ok(true)
        })
    }

    fn try_delete(&self, key: &str) -> StoreResult<bool> {
        self.with_guard(&self.lease_path(key), |path| {
            let Some(expiry) = read_expiry(path)? else {
                return Ok(false);
            };

            match fs::remove_file(path) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
                Err(e) => {
                    return Err(StoreError::Io {
                        path: path.to_path_buf(),
                        source: e,
                    })
                }
            }

            if expiry <= Utc::now() {
                warn!("Removed lease that had already expired: {}", path.display());
                return Ok(false);
            }

            debug!("Lease removed: {}", path.display());
            Ok(true)
        })
    }
}

fn guard_options(create: bool) -> OpenOptions {
    let mut opts = OpenOptions::new();
    opts.create(create).write(true).truncate(false);

    // On Unix, use O_NOFOLLOW to reject symlinks at OS level
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.custom_flags(libc::O_NOFOLLOW);
    }

    opts
}

/// Check if an I/O error indicates the guard is locked by someone else
fn is_lock_contention(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    // ERROR_LOCK_VIOLATION (33)
    #[cfg(windows)]
    if e.raw_os_error() == Some(33) {
        return true;
    }
    false
}

/// Whether the open handle still refers to the file at `path`
#[cfg(unix)]
fn same_file(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match path.symlink_metadata() {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn same_file(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}

/// Read the expiry stored in a lease file, `None` if the file does not exist
pub(crate) fn read_expiry(path: &Path) -> StoreResult<Option<DateTime<Utc>>> {
    check_symlink(path)?;

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    DateTime::parse_from_rfc3339(content.trim())
        .map(|expiry| Some(expiry.with_timezone(&Utc)))
        .map_err(|e| StoreError::InvalidLease {
            path: path.to_path_buf(),
            message: format!("expected an RFC 3339 expiry timestamp: {}", e),
        })
}

fn write_expiry(path: &Path, expiry: DateTime<Utc>) -> StoreResult<()> {
    let io_err = |e: io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = AtomicWriteFile::open(path).map_err(io_err)?;
    writeln!(file, "{}", expiry.to_rfc3339_opts(SecondsFormat::Nanos, true)).map_err(io_err)?;
    file.commit().map_err(io_err)
}

/// Derive the lease filename for a key: `{sanitized key}.{hash}.lease`
///
/// The readable part is truncated; the first 8 hex digits of the key's
/// SHA-256 keep distinct keys apart.
pub fn lease_file_name(key: &str) -> String {
    let mut stem: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();

    if stem.is_empty() {
        stem.push('_');
    }

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    format!("{}.{}.{}", stem, &hash[..8], LEASE_EXTENSION)
}

/// Get the platform-specific cache directory for lease files.
///
/// The directory is created if it does not exist yet.
pub fn default_lease_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("", "", "spinlease").ok_or_else(|| {
        MutexError::Other(
            "Failed to determine lease directory. \
                 Try specifying an explicit directory with --lease-dir."
                .to_string(),
        )
    })?;

    let dir = proj_dirs.cache_dir().join("leases");

    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| MutexError::LeaseDirectoryFailed {
            path: dir.clone(),
            source: e,
        })?;
    }

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lease_file_name_is_sanitized_and_unique() {
        let a = lease_file_name("lock_jobs/nightly");
        let b = lease_file_name("lock_jobs:nightly");

        assert!(a.starts_with("lock_jobs_nightly."));
        assert!(a.ends_with(".lease"));
        assert_ne!(a, b);
        assert!(!a.contains('/'));
    }

    #[test]
    fn test_lease_file_name_truncates_long_keys() {
        let key = "k".repeat(500);
        let name = lease_file_name(&key);
        assert_eq!(name.len(), MAX_STEM_LEN + 1 + 8 + 1 + LEASE_EXTENSION.len());
    }

    #[test]
    fn test_new_rejects_file_path() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(
            FileLeaseStore::new(&file),
            Err(MutexError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_expiry_file_content() {
        let temp = TempDir::new().unwrap();
        let store = FileLeaseStore::new(temp.path()).unwrap();

        assert!(store.try_create("lock_a", Duration::from_secs(4)).unwrap());

        let expiry = read_expiry(&store.lease_path("lock_a")).unwrap().unwrap();
        let remaining = expiry - Utc::now();
        assert!(remaining <= chrono::Duration::seconds(4));
        assert!(remaining > chrono::Duration::seconds(2));
    }

    #[test]
    fn test_out_of_range_ttl_is_a_store_error() {
        let temp = TempDir::new().unwrap();
        let store = FileLeaseStore::new(temp.path()).unwrap();

        assert!(matches!(
            store.try_create("lock_a", Duration::from_secs(10_000_000_000_000)),
            Err(StoreError::Other(_))
        ));
        assert!(!store.lease_path("lock_a").exists());
    }

    #[test]
    fn test_orphaned_guard_removed_only_without_lease() {
        let temp = TempDir::new().unwrap();
        let store = FileLeaseStore::new(temp.path()).unwrap();
        let guard = store.lease_path("lock_a").with_extension(GUARD_EXTENSION);

        store.try_create("lock_a", Duration::from_secs(5)).unwrap();
        assert!(!store.remove_orphaned_guard(&guard).unwrap());
        assert!(guard.exists());

        store.try_delete("lock_a").unwrap();
        assert!(store.remove_orphaned_guard(&guard).unwrap());
        assert!(!guard.exists());

        // A fresh guard is created on the next use
        assert!(store.try_create("lock_a", Duration::from_secs(5)).unwrap());
        assert!(guard.exists());
    }

    #[test]
    fn test_held_guard_is_left_alone() {
        let temp = TempDir::new().unwrap();
        let store = FileLeaseStore::new(temp.path()).unwrap();
        let guard_path = store.lease_path("lock_a").with_extension(GUARD_EXTENSION);
        let holder = guard_options(true).open(&guard_path).unwrap();
        holder.lock_exclusive().unwrap();

        assert!(!store.remove_orphaned_guard(&guard_path).unwrap());
        assert!(guard_path.exists());
    }

    #[test]
    fn test_corrupt_lease_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = FileLeaseStore::new(temp.path()).unwrap();
        fs::write(store.lease_path("lock_a"), "not a timestamp").unwrap();

        assert!(matches!(
            store.try_create("lock_a", Duration::from_secs(1)),
            Err(StoreError::InvalidLease { .. })
        ));
    }
}
