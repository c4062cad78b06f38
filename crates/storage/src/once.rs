//! Run-once markers for setup/teardown shared by every worker of a session.
//!
//! Each (directory, phase) pair gets a lock file and a `.done` marker named
//! by a SHA-256 of the canonical directory path. A worker that starts after
//! the phase completed sees the marker and skips it, even though its own
//! in-memory bookkeeping is empty.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::lock::FileLock;

#[derive(Debug, Clone)]
pub struct OnceMarker {
    dir: PathBuf,
}

impl OnceMarker {
    /// Markers live under `dir`; use one directory per test session.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        OnceMarker { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `f` unless `phase` already completed for `scope` in this session.
    /// Returns whether `f` ran. A failing `f` leaves no marker, so the next
    /// worker tries again.
    pub fn run_once<E>(
        &self,
        scope: &Path,
        phase: &str,
        f: impl FnOnce() -> Result<(), E>,
    ) -> Result<bool, E>
    where
        E: From<StoreError>,
    {
        let key = marker_key(scope, phase);
        let _lock = FileLock::acquire(&self.dir.join(format!("{}.lock", key)))?;
        let done = self.dir.join(format!("{}.done", key));
        if done.exists() {
            tracing::debug!(scope = %scope.display(), phase, "already executed; skipping");
            return Ok(false);
        }
        f()?;
        fs::write(&done, scope.to_string_lossy().as_bytes())
            .map_err(|e| StoreError::io(&done, e))?;
        Ok(true)
    }

    pub fn is_done(&self, scope: &Path, phase: &str) -> bool {
        self.dir
            .join(format!("{}.done", marker_key(scope, phase)))
            .exists()
    }

    /// Forget every marker of this session.
    pub fn reset(&self) -> Result<(), StoreError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.dir, e)),
        }
    }
}

fn marker_key(scope: &Path, phase: &str) -> String {
    let canonical = fs::canonicalize(scope).unwrap_or_else(|_| scope.to_owned());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("{}_{}", phase, hex)
}
