use crate::error::{MutexError, Result};
use crate::store::{read_expiry, FileLeaseStore, GUARD_EXTENSION, LEASE_EXTENSION};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CleanLeaseConfig {
    pub dir: PathBuf,
    /// Only remove leases that expired at least this long ago
    pub older_than: Option<Duration>,
    pub dry_run: bool,
}

/// Remove expired lease files left behind by crashed or overrunning holders.
///
/// Live leases are never touched. Removal takes the same guard as the store.
/// A second pass removes guard files whose lease is gone, skipping any guard
/// another process holds an flock on.
pub fn clean_leases(config: &CleanLeaseConfig) -> Result<Vec<PathBuf>> {
    if !config.dir.is_dir() {
        return Err(MutexError::NotADirectory(config.dir.clone()));
    }

    let grace = match config.older_than {
        Some(d) => chrono::Duration::from_std(d).map_err(|e| {
            MutexError::Other(format!("--older-than is out of range: {}", e))
        })?,
        None => chrono::Duration::zero(),
    };

    let store = FileLeaseStore::new(&config.dir)?;
    let mut cleaned = Vec::new();

    for path in regular_files(&config.dir, LEASE_EXTENSION)? {
        if config.dry_run {
            match read_expiry(&path) {
                Ok(Some(expiry)) if is_removable(expiry, grace) => {
                    debug!("Would remove expired lease: {}", path.display());
                    cleaned.push(path);
                }
                Ok(_) => debug!("Lease still live, skipping: {}", path.display()),
                Err(e) => warn!("Error reading lease file {}: {}", path.display(), e),
            }
            continue;
        }

        match store.remove_if_expired(&path, grace) {
            Ok(true) => {
                debug!("Removed expired lease: {}", path.display());
                cleaned.push(path);
            }
            Ok(false) => debug!("Lease still live or already gone, skipping: {}", path.display()),
            Err(e) => warn!("Failed to clean lease file {}: {}", path.display(), e),
        }
    }

    for path in regular_files(&config.dir, GUARD_EXTENSION)? {
        if config.dry_run {
            if path.with_extension(LEASE_EXTENSION).symlink_metadata().is_err() {
                debug!("Would remove orphaned guard: {}", path.display());
                cleaned.push(path);
            }
            continue;
        }

        match store.remove_orphaned_guard(&path) {
            Ok(true) => {
                debug!("Removed orphaned guard: {}", path.display());
                cleaned.push(path);
            }
            Ok(false) => debug!("Guard still in use, skipping: {}", path.display()),
            Err(e) => warn!("Failed to clean guard file {}: {}", path.display(), e),
        }
    }

    Ok(cleaned)
}

fn is_removable(expiry: DateTime<Utc>, grace: chrono::Duration) -> bool {
    expiry
        .checked_add_signed(grace)
        .is_some_and(|removable_at| removable_at <= Utc::now())
}

/// Regular files in `dir` with the given extension, symlinks excluded
fn regular_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| MutexError::ReadFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(MutexError::Io)?;
        let path = entry.path();

        // Get file type WITHOUT following symlinks
        let file_type = entry.file_type().map_err(MutexError::Io)?;
        if file_type.is_symlink() {
            debug!("Skipping symlink: {}", path.display());
            continue;
        }
        if file_type.is_file() && has_extension(&path, extension) {
            files.push(path);
        }
    }

    Ok(files)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some(extension)
}
