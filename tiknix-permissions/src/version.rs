//! Durable permission cache version.
//!
//! A one-line file holding an integer. The permission cache folds it into
//! its shared-tier key, so bumping it orphans every copy any process has
//! stored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tiknix_core::{system_clock, Clock, PermissionError};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct VersionFile {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl VersionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, system_clock())
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current version; `0` when the file is missing or unreadable.
    pub fn read(&self) -> i64 {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents.trim().parse().unwrap_or_else(|_| {
                debug!(path = %self.path.display(), "Unparseable version file, treating as 0");
                0
            }),
            Err(_) => 0,
        }
    }

    /// Write a new version and return it.
    ///
    /// The new value is the current time in seconds, or one past the old
    /// value if that is larger, so two bumps within a second still differ.
    /// The file is replaced through a rename; concurrent writers race
    /// harmlessly.
    pub fn bump(&self) -> Result<i64, PermissionError> {
        let next = self.clock.now().timestamp().max(self.read().saturating_add(1));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }
        let tmp = self
            .path
            .with_extension(format!("tmp.{}", std::process::id()));
        std::fs::write(&tmp, next.to_string()).map_err(|e| self.error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            self.error(e)
        })?;

        Ok(next)
    }

    fn error(&self, e: std::io::Error) -> PermissionError {
        PermissionError::VersionFile {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tiknix_core::ManualClock;

    #[test]
    fn test_missing_file_reads_zero() {
        let dir = TempDir::new().unwrap();
        let file = VersionFile::new(dir.path().join("nope"));
        assert_eq!(file.read(), 0);
    }

    #[test]
    fn test_bump_writes_timestamp() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let file = VersionFile::with_clock(
            dir.path().join("cache").join(".permission_cache_version"),
            Arc::new(clock.clone()),
        );

        let version = file.bump().unwrap();
        assert_eq!(version, clock.now().timestamp());
        assert_eq!(file.read(), version);
    }

    #[test]
    fn test_bumps_in_same_second_differ() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::starting_now();
        let file = VersionFile::with_clock(dir.path().join("v"), Arc::new(clock));

        let a = file.bump().unwrap();
        let b = file.bump().unwrap();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn test_bump_saturates_at_max() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v");
        std::fs::write(&path, i64::MAX.to_string()).unwrap();

        let file = VersionFile::new(&path);
        assert_eq!(file.bump().unwrap(), i64::MAX);
        assert_eq!(file.read(), i64::MAX);
    }

    #[test]
    fn test_garbage_reads_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v");
        std::fs::write(&path, "not a number").unwrap();
        assert_eq!(VersionFile::new(&path).read(), 0);
    }

    #[test]
    fn test_bump_into_unwritable_location_errors() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let version = VersionFile::new(file.path().join("under-a-file"));
        assert!(matches!(
            version.bump(),
            Err(PermissionError::VersionFile { .. })
        ));
    }
}
