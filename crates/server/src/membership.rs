//! The two-tier membership lock manager.
//!
//! Every membership edit runs inside [`with_membership_lock`]:
//!
//! 1. the host-local lock is taken (serializes local administrators),
//! 2. the membership view is refreshed with a fresh store read,
//! 3. only when that view shows more than one member is the cluster-wide
//!    named lock taken as well - a lone node has no peer to race with,
//! 4. the critical section runs on the fresh document,
//! 5. locks release in reverse acquisition order on every exit path.
//!
//! Failing to acquire either lock is fatal for the request; there is no
//! retry beyond the bounded wait.

use clusterd_types::{ClusterConfigDocument, ClusterError, Result};
use tracing::debug;

use crate::{context::ClusterContext, local_lock::LocalMutex};

/// Name of the cluster-wide lock guarding membership edits.
pub const MEMBERSHIP_LOCK: &str = "membership";

/// Runs `f` on a fresh document inside the membership critical section.
pub fn with_membership_lock<T>(
    ctx: &ClusterContext,
    f: impl FnOnce(ClusterConfigDocument) -> Result<T>,
) -> Result<T> {
    let _local = LocalMutex::acquire(&ctx.lock_path, ctx.lock_timeout)?;

    // Refresh the membership view now that local edits are serialized.
    let doc = ctx.store.read().map_err(ClusterError::from_store)?;

    // Declared after `_local` so it drops first: reverse acquisition order.
    let _cluster = if doc.nodelist.len() > 1 {
        Some(
            ctx.store
                .lock(MEMBERSHIP_LOCK, ctx.lock_timeout)
                .map_err(ClusterError::from_store)?,
        )
    } else {
        debug!("Single-member view; skipping cluster-wide lock");
        None
    };

    f(doc)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use clusterd_store::{ConfigStore, MemoryStore, StoreLock};
    use clusterd_test_utils::TestDir;
    use clusterd_types::{
        Digest, NodeEntry, StoreError, TotemConfig,
    };

    use super::*;
    use crate::{comm::GroupComm, trust::TrustStore};

    /// Store wrapper that counts (or forbids) cluster-wide lock calls.
    struct LockSpy {
        inner: MemoryStore,
        lock_calls: AtomicUsize,
        forbid_lock: bool,
    }

    impl LockSpy {
        fn new(inner: MemoryStore, forbid_lock: bool) -> Self {
            Self { inner, lock_calls: AtomicUsize::new(0), forbid_lock }
        }
    }

    impl ConfigStore for LockSpy {
        fn exists(&self) -> bool {
            self.inner.exists()
        }

        fn read(&self) -> Result<ClusterConfigDocument, StoreError> {
            self.inner.read()
        }

        fn write(
            &self,
            doc: &ClusterConfigDocument,
            expected: Option<&Digest>,
        ) -> Result<Digest, StoreError> {
            self.inner.write(doc, expected)
        }

        fn lock(&self, name: &str, timeout: Duration) -> Result<StoreLock, StoreError> {
            assert!(!self.forbid_lock, "cluster-wide lock must not be taken here");
            self.lock_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.lock(name, timeout)
        }

        fn read_authkey(&self) -> Result<Vec<u8>, StoreError> {
            self.inner.read_authkey()
        }

        fn authkey_exists(&self) -> bool {
            self.inner.authkey_exists()
        }

        fn write_authkey(&self, key: &[u8]) -> Result<(), StoreError> {
            self.inner.write_authkey(key)
        }
    }

    struct QuorateComm;

    impl GroupComm for QuorateComm {
        fn quorate(&self) -> bool {
            true
        }

        fn evict_node(&self, _nodeid: u32) -> std::io::Result<()> {
            Ok(())
        }

        fn restart_services(&self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct NoTrust;

    impl TrustStore for NoTrust {
        fn merge_node(&self, _node: &str) -> std::io::Result<()> {
            Ok(())
        }

        fn fingerprint(&self, _node: &str) -> Option<String> {
            None
        }
    }

    fn seeded_store(member_count: u32) -> MemoryStore {
        let store = MemoryStore::new();
        let mut doc = ClusterConfigDocument::new(TotemConfig::new("test"));
        for id in 1..=member_count {
            let name = format!("node{id}");
            doc.nodelist.insert(
                name.clone(),
                NodeEntry { name, nodeid: id, quorum_votes: 1, links: Default::default() },
            );
        }
        store.write(&doc, None).unwrap();
        store
    }

    fn ctx_over(spy: Arc<LockSpy>, dir: &TestDir) -> ClusterContext {
        ClusterContext::new(
            spy,
            Arc::new(QuorateComm),
            Arc::new(NoTrust),
            "node1",
            dir.join("membership.lock"),
            Duration::from_secs(1),
            dir.join("qdevice.sock"),
        )
    }

    #[test]
    fn test_single_member_skips_cluster_lock() {
        let dir = TestDir::new();
        let spy = Arc::new(LockSpy::new(seeded_store(1), true));
        let ctx = ctx_over(Arc::clone(&spy), &dir);

        with_membership_lock(&ctx, |doc| {
            assert_eq!(doc.nodelist.len(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_multi_member_takes_cluster_lock() {
        let dir = TestDir::new();
        let spy = Arc::new(LockSpy::new(seeded_store(2), false));
        let ctx = ctx_over(Arc::clone(&spy), &dir);

        with_membership_lock(&ctx, |_| Ok(())).unwrap();
        assert_eq!(spy.lock_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cluster_lock_released_after_failure() {
        let dir = TestDir::new();
        let spy = Arc::new(LockSpy::new(seeded_store(2), false));
        let ctx = ctx_over(Arc::clone(&spy), &dir);

        let failed: Result<()> = with_membership_lock(&ctx, |_| Err(ClusterError::NoQuorum));
        assert!(matches!(failed, Err(ClusterError::NoQuorum)));

        // Both locks must be free again.
        with_membership_lock(&ctx, |_| Ok(())).unwrap();
        assert_eq!(spy.lock_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_document_maps_to_not_clustered() {
        let dir = TestDir::new();
        let spy = Arc::new(LockSpy::new(MemoryStore::new(), true));
        let ctx = ctx_over(spy, &dir);

        let outcome: Result<()> = with_membership_lock(&ctx, |_| Ok(()));
        assert!(matches!(outcome, Err(ClusterError::NotClustered)));
    }
}
