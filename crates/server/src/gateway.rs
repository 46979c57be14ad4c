//! The remote side of a cluster join.
//!
//! A joining candidate talks to an existing member: it authenticates,
//! fetches join information, and has the member run the add-node edit on its
//! behalf. [`JoinGateway`] is that seam. The wire transport is the embedding
//! product's business; [`StoreGateway`] ships in-repo and drives the same
//! protocol through a shared store root (deployments where both sides can
//! reach the replicated filesystem, and every test).

use clusterd_types::{
    ClusterError, Digest, NodeEntry, Result, StoreError, TotemConfig,
    error::{AuthenticationFailedSnafu, FingerprintMismatchSnafu, UnknownNodeSnafu},
};
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::{
    context::ClusterContext,
    registry::{self, AddNodeOutcome, AddNodeRequest},
};

/// Join information an existing member hands to a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinInfo {
    /// The member a candidate should preferably talk to.
    pub preferred_node: String,
    /// Current members, augmented with resolved address and trust
    /// fingerprint.
    pub nodelist: Vec<JoinNodeEntry>,
    /// The cluster's totem settings.
    pub totem: TotemConfig,
    /// Digest of the document this information was derived from.
    pub config_digest: String,
}

/// One member as seen by a joining candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinNodeEntry {
    /// The member's document entry.
    #[serde(flatten)]
    pub entry: NodeEntry,
    /// Resolved ring-0 address (falls back to the node name).
    pub address: String,
    /// Fingerprint of the member's trusted host keys, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Candidate-side interface to the cluster being joined.
pub trait JoinGateway: Send + Sync {
    /// Verifies the supplied credential and the target's identity
    /// fingerprint.
    fn authenticate(&self, credential: &str, fingerprint: &str) -> Result<()>;

    /// Fetches the cluster's join information.
    fn join_info(&self) -> Result<JoinInfo>;

    /// Runs the add-node edit on the cluster side on behalf of `name`.
    fn add_node(&self, name: &str, request: &AddNodeRequest) -> Result<AddNodeOutcome>;
}

/// Builds [`JoinInfo`] from a member's local view.
///
/// Fails with [`ClusterError::NotClustered`] when no document exists and
/// [`ClusterError::UnknownNode`] when `preferred` names no member.
pub fn build_join_info(ctx: &ClusterContext, preferred: Option<&str>) -> Result<JoinInfo> {
    let doc = ctx.store.read().map_err(ClusterError::from_store)?;

    let preferred_node = match preferred {
        Some(name) => {
            ensure!(doc.nodelist.contains_key(name), UnknownNodeSnafu { identifier: name });
            name.to_string()
        },
        None => ctx.local_node.clone(),
    };

    let nodelist = doc
        .nodelist
        .values()
        .map(|entry| JoinNodeEntry {
            address: entry.links.get(&0).cloned().unwrap_or_else(|| entry.name.clone()),
            fingerprint: ctx.trust.fingerprint(&entry.name),
            entry: entry.clone(),
        })
        .collect();

    let config_digest = match doc.digest {
        Some(digest) => digest.to_hex(),
        None => Digest::of_document(&doc)
            .map_err(|source| ClusterError::from_store(StoreError::Serialize { source }))?
            .to_hex(),
    };

    Ok(JoinInfo { preferred_node, nodelist, totem: doc.totem, config_digest })
}

/// [`JoinGateway`] over a shared store root.
///
/// Authentication follows the join-token pattern: the candidate presents the
/// cluster's join secret, and verifies the cluster's identity against the
/// fingerprint of its key material.
pub struct StoreGateway {
    ctx: ClusterContext,
    host: String,
    join_secret: String,
}

impl StoreGateway {
    /// Gateway into the cluster reachable through `ctx`, labeled `host` in
    /// error messages.
    pub fn new(ctx: ClusterContext, host: impl Into<String>, join_secret: impl Into<String>) -> Self {
        Self { ctx, host: host.into(), join_secret: join_secret.into() }
    }

    /// Fingerprint the cluster presents to candidates: the digest of its key
    /// material.
    pub fn cluster_fingerprint(&self) -> Result<String> {
        let key = self.ctx.store.read_authkey().map_err(ClusterError::from_store)?;
        Ok(Digest::of_bytes(&key).to_hex())
    }
}

impl JoinGateway for StoreGateway {
    fn authenticate(&self, credential: &str, fingerprint: &str) -> Result<()> {
        ensure!(
            credential == self.join_secret,
            AuthenticationFailedSnafu { host: self.host.clone(), reason: "join secret rejected" }
        );

        let actual = self.cluster_fingerprint()?;
        ensure!(
            fingerprint == actual,
            FingerprintMismatchSnafu { expected: fingerprint, actual }
        );
        Ok(())
    }

    fn join_info(&self) -> Result<JoinInfo> {
        build_join_info(&self.ctx, None)
    }

    fn add_node(&self, name: &str, request: &AddNodeRequest) -> Result<AddNodeOutcome> {
        registry::add_node(&self.ctx, name, request)
    }
}
