use crate::error::{StoreError, StoreResult};
use std::path::Path;

/// Whether `path` itself is a symlink, without following it
pub fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|metadata| metadata.file_type().is_symlink())
        .unwrap_or(false)
}

/// Reject symlinked lease files so a lease can never redirect writes
pub fn check_symlink(path: &Path) -> StoreResult<()> {
    if is_symlink(path) {
        return Err(StoreError::SymlinkNotAllowed {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
