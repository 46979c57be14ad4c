//! Shared test helpers for the clusterd crates.
//!
//! - [`TestDir`] - self-cleaning temporary directory with path helpers
//! - [`assert_eventually`] - poll an async condition instead of sleeping

#![deny(unsafe_code)]
#![allow(clippy::expect_used)] // test helpers panic on setup failure on purpose

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tempfile::TempDir;
use tokio::time::{Instant, sleep};

/// A temporary directory that is removed when dropped.
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    /// Creates a fresh temporary directory.
    pub fn new() -> Self {
        Self { dir: TempDir::new().expect("create temp dir") }
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A path below the directory (not created).
    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Writes a file below the directory, creating parent directories.
    pub fn write_file(&self, rel: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, contents).expect("write test file");
        path
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls `condition` every 10ms until it holds or `timeout` expires.
///
/// Returns whether the condition became true in time. Use instead of fixed
/// sleeps so timing-dependent tests stay fast and non-flaky.
pub async fn assert_eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_is_removed_on_drop() {
        let kept_path = {
            let dir = TestDir::new();
            dir.write_file("sub/file.txt", "x");
            assert!(dir.join("sub/file.txt").exists());
            dir.path().to_path_buf()
        };
        assert!(!kept_path.exists());
    }

    #[tokio::test]
    async fn test_assert_eventually_observes_change() {
        let mut calls = 0;
        let became_true = assert_eventually(Duration::from_secs(1), || {
            calls += 1;
            calls >= 3
        })
        .await;
        assert!(became_true);
    }

    #[tokio::test]
    async fn test_assert_eventually_times_out() {
        let became_true = assert_eventually(Duration::from_millis(30), || false).await;
        assert!(!became_true);
    }
}
