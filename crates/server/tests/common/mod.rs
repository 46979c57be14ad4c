//! Test harness for membership integration tests.
//!
//! Builds [`ClusterContext`]s over in-memory stores with controllable
//! collaborator doubles, so tests can pin down quorum state, observe
//! eviction/restart side effects, and fail loudly when the cluster-wide
//! lock is touched where it must not be.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use clusterd_server::{comm::GroupComm, context::ClusterContext, trust::TrustStore};
use clusterd_store::{ConfigStore, MemoryStore, StoreLock};
use clusterd_test_utils::TestDir;
use clusterd_types::{ClusterConfigDocument, Digest, NodeEntry, StoreError, TotemConfig};
use parking_lot::Mutex;

/// Group-communication double with scripted quorum and recorded effects.
#[derive(Default)]
pub struct ScriptedComm {
    pub quorate: AtomicBool,
    pub evicted: Mutex<Vec<u32>>,
    pub restarts: AtomicUsize,
    pub fail_evict: AtomicBool,
    pub fail_restart: AtomicBool,
}

impl ScriptedComm {
    pub fn quorate_comm() -> Arc<Self> {
        let comm = Self::default();
        comm.quorate.store(true, Ordering::SeqCst);
        Arc::new(comm)
    }
}

impl GroupComm for ScriptedComm {
    fn quorate(&self) -> bool {
        self.quorate.load(Ordering::SeqCst)
    }

    fn evict_node(&self, nodeid: u32) -> io::Result<()> {
        if self.fail_evict.load(Ordering::SeqCst) {
            return Err(io::Error::other("eviction tool unavailable"));
        }
        self.evicted.lock().push(nodeid);
        Ok(())
    }

    fn restart_services(&self) -> io::Result<()> {
        if self.fail_restart.load(Ordering::SeqCst) {
            return Err(io::Error::other("service manager unavailable"));
        }
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Trust double recording merges; optionally failing them.
#[derive(Default)]
pub struct ScriptedTrust {
    pub merged: Mutex<Vec<String>>,
    pub fail_merge: AtomicBool,
}

impl TrustStore for ScriptedTrust {
    fn merge_node(&self, node: &str) -> io::Result<()> {
        if self.fail_merge.load(Ordering::SeqCst) {
            return Err(io::Error::other("no staged host keys"));
        }
        self.merged.lock().push(node.to_string());
        Ok(())
    }

    fn fingerprint(&self, node: &str) -> Option<String> {
        self.merged
            .lock()
            .iter()
            .any(|n| n == node)
            .then(|| format!("fp-{node}"))
    }
}

/// Store wrapper that fails the test if the cluster-wide lock is taken.
pub struct ForbidClusterLock {
    inner: MemoryStore,
}

impl ForbidClusterLock {
    pub fn over(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self { inner })
    }
}

impl ConfigStore for ForbidClusterLock {
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

    fn lock(&self, name: &str, _timeout: Duration) -> Result<StoreLock, StoreError> {
        panic!("cluster-wide lock '{name}' taken on a single-member cluster");
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

/// One node's worth of harness state.
pub struct TestNode {
    pub ctx: ClusterContext,
    pub store: MemoryStore,
    pub comm: Arc<ScriptedComm>,
    pub trust: Arc<ScriptedTrust>,
    _dir: TestDir,
}

impl TestNode {
    /// A context named `node_name` over a fresh in-memory store.
    pub fn new(node_name: &str) -> Self {
        Self::over_store(node_name, MemoryStore::new())
    }

    /// A context named `node_name` over an existing (possibly shared) store.
    pub fn over_store(node_name: &str, store: MemoryStore) -> Self {
        let dir = TestDir::new();
        let comm = ScriptedComm::quorate_comm();
        let trust = Arc::new(ScriptedTrust::default());
        let ctx = ClusterContext::new(
            Arc::new(store.clone()),
            Arc::clone(&comm) as Arc<dyn GroupComm>,
            Arc::clone(&trust) as Arc<dyn TrustStore>,
            node_name,
            dir.join("membership.lock"),
            Duration::from_secs(2),
            dir.join("qdevice.sock"),
        );
        Self { ctx, store, comm, trust, _dir: dir }
    }

    /// Replaces the context's store with one that forbids cluster locking.
    pub fn forbid_cluster_lock(&mut self) {
        self.ctx.store = ForbidClusterLock::over(self.store.clone());
    }
}

/// Builds a document with `names` as members, ids assigned in order from 1,
/// each with a ring-0 address `10.0.0.<id>`.
pub fn seeded_doc(cluster_name: &str, names: &[&str]) -> ClusterConfigDocument {
    let mut doc = ClusterConfigDocument::new(TotemConfig::new(cluster_name));
    doc.totem.interfaces.insert(
        0,
        clusterd_types::TotemInterface { linknumber: 0, knet_link_priority: None },
    );
    for (i, name) in names.iter().enumerate() {
        let nodeid = (i + 1) as u32;
        doc.nodelist.insert(
            name.to_string(),
            NodeEntry {
                name: name.to_string(),
                nodeid,
                quorum_votes: 1,
                links: [(0u8, format!("10.0.0.{nodeid}"))].into(),
            },
        );
    }
    doc
}

/// Seeds `node`'s store with a document and an authkey.
pub fn seed(node: &TestNode, doc: &ClusterConfigDocument) {
    node.store.write(doc, None).unwrap();
    node.store.write_authkey(&[0xA5; 32]).unwrap();
}
