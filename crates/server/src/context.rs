//! Shared handle bundle for membership operations.

use std::{path::PathBuf, sync::Arc, time::Duration};

use clusterd_store::ConfigStore;

use crate::{comm::GroupComm, trust::TrustStore};

/// Everything a membership operation needs: the collaborator handles, the
/// local node's identity, and the lock discipline parameters.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct ClusterContext {
    /// The replicated configuration store.
    pub store: Arc<dyn ConfigStore>,
    /// The group-communication daemon.
    pub comm: Arc<dyn GroupComm>,
    /// Host-key trust material.
    pub trust: Arc<dyn TrustStore>,
    /// This node's canonical name.
    pub local_node: String,
    /// Path of the host-local membership lock file.
    pub lock_path: PathBuf,
    /// Bounded wait for local and cluster-wide lock acquisition.
    pub lock_timeout: Duration,
    /// Path of the quorum-witness helper's status socket.
    pub qdevice_socket: PathBuf,
}

impl ClusterContext {
    /// Creates a context over the given collaborators.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        comm: Arc<dyn GroupComm>,
        trust: Arc<dyn TrustStore>,
        local_node: impl Into<String>,
        lock_path: impl Into<PathBuf>,
        lock_timeout: Duration,
        qdevice_socket: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            comm,
            trust,
            local_node: local_node.into(),
            lock_path: lock_path.into(),
            lock_timeout,
            qdevice_socket: qdevice_socket.into(),
        }
    }
}
