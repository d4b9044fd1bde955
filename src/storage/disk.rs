//! Free disk space probes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors that can occur while probing free space.
#[derive(Debug, Error)]
pub enum DiskError {
    /// The `statvfs` call failed.
    #[error("failed to query free space for {path}: {source}")]
    Query {
        /// Path that was probed.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// No probe exists for this platform.
    #[error("free space queries are not supported on this platform")]
    Unsupported,
}

/// Reports free space on the storage volume.
pub trait DiskSpaceGuard {
    /// Free space available to unprivileged users, in gigabytes (1e9 bytes).
    fn free_space_gb(&self) -> Result<f64, DiskError>;
}

/// Queries the filesystem holding `path` with `statvfs(3)` via `nix`.
#[derive(Debug, Clone)]
pub struct StatvfsGuard {
    path: PathBuf,
}

impl StatvfsGuard {
    /// Creates a guard for the volume holding `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The probed path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiskSpaceGuard for StatvfsGuard {
    fn free_space_gb(&self) -> Result<f64, DiskError> {
        let bytes = available_bytes(&self.path)?;
        Ok(bytes as f64 / 1.0e9)
    }
}

#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn available_bytes(path: &Path) -> Result<u64, DiskError> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|errno| DiskError::Query {
        path: path.to_path_buf(),
        source: std::io::Error::from(errno),
    })?;

    Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

#[cfg(not(unix))]
fn available_bytes(_path: &Path) -> Result<u64, DiskError> {
    Err(DiskError::Unsupported)
}

/// Guard reporting a settable, fixed amount of free space.
///
/// Clones share the value, so tests can shrink the disk mid-run.
#[derive(Debug, Clone)]
pub struct FixedDiskSpace {
    gb: Arc<Mutex<f64>>,
}

impl FixedDiskSpace {
    /// Creates a guard reporting `gb` gigabytes free.
    pub fn new(gb: f64) -> Self {
        Self {
            gb: Arc::new(Mutex::new(gb)),
        }
    }

    /// Changes the reported free space for every clone.
    pub fn set(&self, gb: f64) {
        if let Ok(mut value) = self.gb.lock() {
            *value = gb;
        }
    }
}

impl DiskSpaceGuard for FixedDiskSpace {
    fn free_space_gb(&self) -> Result<f64, DiskError> {
        Ok(self.gb.lock().map(|v| *v).unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_space_shared() {
        let guard = FixedDiskSpace::new(4.0);
        let handle = guard.clone();
        handle.set(0.4);
        assert_eq!(guard.free_space_gb().unwrap(), 0.4);
    }

    #[cfg(unix)]
    #[test]
    fn test_statvfs_on_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let guard = StatvfsGuard::new(dir.path());
        let gb = guard.free_space_gb().unwrap();
        assert!(gb >= 0.0);
    }

    #[cfg(unix)]
    #[test]
    fn test_statvfs_missing_path() {
        let guard = StatvfsGuard::new("/definitely/not/a/real/path");
        assert!(matches!(
            guard.free_space_gb(),
            Err(DiskError::Query { .. })
        ));
    }
}
