//! Host-local membership mutation lock.
//!
//! All membership edits issued on one node are serialized through an
//! OS-level exclusive lock on a well-known file, independent of cluster
//! size. This protects against two local administrators racing before any
//! cluster-wide coordination is considered.
//!
//! The lock is released on every exit path: the guard unlocks on drop, so a
//! failing (or panicking) critical section cannot leave the file locked, and
//! a crashed process loses the lock automatically when the kernel closes the
//! file handle.

use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use clusterd_types::{ClusterError, Result, error::IoSnafu};
use fs2::FileExt;
use snafu::ResultExt;
use tracing::{debug, trace};

/// Poll interval while the lock file is held elsewhere.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An exclusive host-local lock, held until dropped.
#[derive(Debug)]
pub struct LocalMutex {
    file: fs::File,
    path: PathBuf,
}

impl LocalMutex {
    /// Acquires the lock at `path`, waiting at most `timeout`.
    ///
    /// Parent directories are created as needed. Fails with
    /// [`ClusterError::LockTimeout`] if the lock stays contended past the
    /// deadline; acquisition is never retried beyond that.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context(IoSnafu {
                context: format!("creating lock directory {}", parent.display()),
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .context(IoSnafu { context: format!("opening lock file {}", path.display()) })?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(path = %path.display(), "Acquired local membership lock");
                    return Ok(Self { file, path: path.to_path_buf() });
                },
                Err(e) if is_contended(&e) => {
                    if Instant::now() >= deadline {
                        return Err(ClusterError::LockTimeout {
                            name: path.display().to_string(),
                            timeout,
                        });
                    }
                    trace!(path = %path.display(), "Local lock contended; waiting");
                    std::thread::sleep(POLL_INTERVAL);
                },
                Err(source) => {
                    return Err(ClusterError::Io {
                        context: format!("locking {}", path.display()),
                        source,
                    });
                },
            }
        }
    }

    /// The lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LocalMutex {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "Released local membership lock");
    }
}

/// Whether a lock error means "held by someone else" rather than a real
/// failure. EWOULDBLOCK is 11 on Linux and 35 on macOS.
fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == Some(11)
        || e.raw_os_error() == Some(35)
}

/// Runs `f` while holding the host-local lock at `path`.
pub fn with_local_lock<T>(
    path: &Path,
    timeout: Duration,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let _guard = LocalMutex::acquire(path, timeout)?;
    f()
}
