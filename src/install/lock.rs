use std::fs::{File, OpenOptions};
use std::path::Path;

use fs4::fs_std::FileExt;
use tracing::debug;

use crate::install::error::InstallError;

/// Exclusive advisory lock held for the duration of an install or symlink switch.
///
/// The mount point and the active symlink are host-wide, so only one holder may
/// touch them at a time. The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct InstallLock {
    _file: File,
}

impl InstallLock {
    /// Blocks until the lock at `path` is acquired.
    pub fn acquire(path: &Path) -> Result<Self, InstallError> {
        let lock_error = |source| InstallError::Lock {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(lock_error)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(lock_error)?;

        debug!("Waiting for install lock {:?}", path);
        FileExt::lock_exclusive(&file).map_err(lock_error)?;
        debug!("Acquired install lock {:?}", path);

        Ok(Self { _file: file })
    }
}
