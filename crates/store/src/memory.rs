//! In-memory configuration store for tests and embedding.

use std::{
    collections::BTreeSet,
    sync::Arc,
    time::Duration,
};

use clusterd_types::{ClusterConfigDocument, Digest, StoreError};
use parking_lot::Mutex;

use crate::client::{ConfigStore, StoreLock, note_stale_write, poll_with_deadline};

/// Poll interval while waiting on a contended named lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// In-memory [`ConfigStore`].
///
/// Documents are stored in their serialized form so reads behave exactly
/// like the file backend: every read is a parse of the persisted content
/// with a digest over those bytes. Cloning shares the underlying store,
/// which lets a test hand "both sides" of a cluster the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    document: Mutex<Option<String>>,
    authkey: Mutex<Option<Vec<u8>>>,
    held_locks: Mutex<BTreeSet<String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn exists(&self) -> bool {
        self.inner.document.lock().is_some()
    }

    fn read(&self) -> Result<ClusterConfigDocument, StoreError> {
        let guard = self.inner.document.lock();
        let text = guard.as_ref().ok_or(StoreError::DocumentMissing)?;
        let mut doc: ClusterConfigDocument = toml::from_str(text)
            .map_err(|source| StoreError::Parse { path: "<memory>".into(), source })?;
        doc.digest = Some(Digest::of_bytes(text.as_bytes()));
        Ok(doc)
    }

    fn write(
        &self,
        doc: &ClusterConfigDocument,
        expected: Option<&Digest>,
    ) -> Result<Digest, StoreError> {
        let text = toml::to_string(doc).map_err(|source| StoreError::Serialize { source })?;
        let digest = Digest::of_bytes(text.as_bytes());

        let mut guard = self.inner.document.lock();
        let current = guard.as_ref().map(|t| Digest::of_bytes(t.as_bytes()));
        note_stale_write(current.as_ref(), expected);
        *guard = Some(text);
        Ok(digest)
    }

    fn lock(&self, name: &str, timeout: Duration) -> Result<StoreLock, StoreError> {
        let acquired = poll_with_deadline(timeout, LOCK_POLL_INTERVAL, || {
            self.inner.held_locks.lock().insert(name.to_string()).then_some(())
        });
        if acquired.is_none() {
            return Err(StoreError::LockTimeout { name: name.to_string(), timeout });
        }

        let inner = Arc::clone(&self.inner);
        let lock_name = name.to_string();
        Ok(StoreLock::new(name, move || {
            inner.held_locks.lock().remove(&lock_name);
        }))
    }

    fn read_authkey(&self) -> Result<Vec<u8>, StoreError> {
        self.inner
            .authkey
            .lock()
            .clone()
            .ok_or_else(|| StoreError::NotFound { what: "authkey".to_string() })
    }

    fn authkey_exists(&self) -> bool {
        self.inner.authkey.lock().is_some()
    }

    fn write_authkey(&self, key: &[u8]) -> Result<(), StoreError> {
        *self.inner.authkey.lock() = Some(key.to_vec());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::thread;

    use clusterd_types::TotemConfig;

    use super::*;

    #[test]
    fn test_empty_store_has_no_document() {
        let store = MemoryStore::new();
        assert!(!store.exists());
        assert!(matches!(store.read(), Err(StoreError::DocumentMissing)));
    }

    #[test]
    fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();

        store.write(&ClusterConfigDocument::new(TotemConfig::new("shared")), None).unwrap();
        assert_eq!(other.read().unwrap().totem.cluster_name, "shared");
    }

    #[test]
    fn test_lock_contention_times_out() {
        let store = MemoryStore::new();
        let _held = store.lock("membership", Duration::from_millis(50)).unwrap();

        let contended = store.lock("membership", Duration::from_millis(50));
        assert!(matches!(contended, Err(StoreError::LockTimeout { .. })));
    }

    #[test]
    fn test_lock_release_on_drop_unblocks_waiter() {
        let store = MemoryStore::new();
        let held = store.lock("membership", Duration::from_millis(50)).unwrap();

        let waiter = {
            let store = store.clone();
            thread::spawn(move || store.lock("membership", Duration::from_secs(2)).is_ok())
        };
        thread::sleep(Duration::from_millis(50));
        drop(held);
        assert!(waiter.join().unwrap(), "waiter should acquire after release");
    }

    #[test]
    fn test_read_after_write_reflects_digest() {
        let store = MemoryStore::new();
        let digest = store
            .write(&ClusterConfigDocument::new(TotemConfig::new("prod")), None)
            .unwrap();
        assert_eq!(store.read().unwrap().digest, Some(digest));
    }
}
