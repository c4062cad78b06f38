//! Exclusive advisory lock on a sibling lock file.
//!
//! The lock belongs to the open file handle, so two handles opened in the
//! same process exclude each other just as two processes do. Closing the
//! handle releases it, including when the holder crashes.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use crate::error::StoreError;

/// Guard for an exclusive lock; released when dropped.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the lock at `path` is held, creating the file if needed.
    pub fn acquire(path: &Path) -> Result<FileLock, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;
        FileExt::lock_exclusive(&file).map_err(|source| StoreError::Lock {
            path: path.to_owned(),
            source,
        })?;
        Ok(FileLock {
            _file: file,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
