//! The [`ConfigStore`] trait and its lock guard.

use std::time::{Duration, Instant};

use clusterd_types::{ClusterConfigDocument, Digest, StoreError};
use tracing::warn;

/// Client interface to the replicated configuration store.
///
/// Implementations must make [`read`](ConfigStore::read) a fresh read (never
/// a cached view) and [`write`](ConfigStore::write) atomic at the document
/// level: a concurrent reader observes either the old or the new document,
/// never a torn one.
pub trait ConfigStore: Send + Sync {
    /// Whether a cluster configuration document exists.
    fn exists(&self) -> bool;

    /// Reads the current document, capturing its content digest.
    ///
    /// # Errors
    ///
    /// [`StoreError::DocumentMissing`] when no document exists yet.
    fn read(&self) -> Result<ClusterConfigDocument, StoreError>;

    /// Persists the document, returning the digest of the written content.
    ///
    /// `expected` is the digest captured at the read this write is based on.
    /// A mismatch with the currently stored content is logged, not rejected;
    /// the digest is carried for future verification.
    fn write(
        &self,
        doc: &ClusterConfigDocument,
        expected: Option<&Digest>,
    ) -> Result<Digest, StoreError>;

    /// Acquires the cluster-wide named lock, waiting at most `timeout`.
    ///
    /// The lock is held until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// [`StoreError::LockTimeout`] when the lock stays contended past the
    /// deadline.
    fn lock(&self, name: &str, timeout: Duration) -> Result<StoreLock, StoreError>;

    /// Reads the shared authkey material.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no authkey has been generated yet.
    fn read_authkey(&self) -> Result<Vec<u8>, StoreError>;

    /// Whether authkey material exists.
    fn authkey_exists(&self) -> bool;

    /// Persists the shared authkey material.
    fn write_authkey(&self, key: &[u8]) -> Result<(), StoreError>;
}

/// Guard for a held cluster-wide named lock; released on drop.
pub struct StoreLock {
    name: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl StoreLock {
    /// Wraps a backend-specific release action.
    pub fn new(name: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self { name: name.into(), release: Some(Box::new(release)) }
    }

    /// The lock's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLock").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Logs when a write is based on a stale read.
pub(crate) fn note_stale_write(current: Option<&Digest>, expected: Option<&Digest>) {
    if let (Some(current), Some(expected)) = (current, expected) {
        if current != expected {
            warn!(
                expected = %expected,
                found = %current,
                "Document changed since it was read; writing anyway"
            );
        }
    }
}

/// Polls `attempt` until it yields a value or `timeout` elapses.
pub(crate) fn poll_with_deadline<T>(
    timeout: Duration,
    interval: Duration,
    mut attempt: impl FnMut() -> Option<T>,
) -> Option<T> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = attempt() {
            return Some(value);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(interval.min(deadline.saturating_duration_since(Instant::now())));
    }
}
