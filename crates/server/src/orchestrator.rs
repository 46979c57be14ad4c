//! Bootstrap and join orchestration.
//!
//! Both sequences run as background tasks (see [`crate::tasks`]) and hold
//! the host-local lock for their whole duration. The cluster-wide lock is
//! not needed: at bootstrap the document does not exist yet, and during a
//! join the cluster-side edit happens on the remote member under its own
//! membership lock.
//!
//! The trust merge and service restart are not transactional with the
//! document write. A crash in between leaves the document correct and the
//! live view stale until the next restart; that gap is accepted, not
//! retried.

use std::collections::BTreeMap;

use clusterd_types::{
    ClusterConfigDocument, ClusterError, LinkSpec, NodeEntry, Result, TotemConfig, TotemInterface,
    error::{AlreadyClusteredSnafu, ServiceRestartSnafu},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use snafu::ensure;
use tracing::warn;

use crate::{
    context::ClusterContext,
    gateway::JoinGateway,
    local_lock::LocalMutex,
    registry::AddNodeRequest,
    tasks::TaskLog,
};

/// Size of generated cluster key material.
const AUTHKEY_LEN: usize = 256;

/// Parameters for creating a brand-new cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapRequest {
    /// Name of the cluster to create.
    pub cluster_name: String,
    /// Node id for the founding node; defaults to 1.
    #[serde(default)]
    pub nodeid: Option<u32>,
    /// Vote weight for the founding node; defaults to 1.
    #[serde(default)]
    pub votes: Option<u32>,
    /// Ring-0 link; defaults to the node's own name.
    #[serde(default)]
    pub link0: Option<LinkSpec>,
    /// Optional ring-1 link.
    #[serde(default)]
    pub link1: Option<LinkSpec>,
}

/// Parameters for joining an existing cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Host to join through.
    pub hostname: String,
    /// Join credential presented to that host.
    pub credential: String,
    /// Expected identity fingerprint of the cluster.
    pub fingerprint: String,
    /// Explicit node id for this node; allocated remotely when omitted.
    #[serde(default)]
    pub nodeid: Option<u32>,
    /// Vote weight; defaults to 1.
    #[serde(default)]
    pub votes: Option<u32>,
    /// Forces an idempotent re-add when this node is already a member.
    #[serde(default)]
    pub force: bool,
    /// Ring-0 link for this node.
    #[serde(default)]
    pub link0: Option<LinkSpec>,
    /// Ring-1 link for this node.
    #[serde(default)]
    pub link1: Option<LinkSpec>,
}

/// Creates a new cluster with the local node as its only member.
pub fn bootstrap(ctx: &ClusterContext, req: &BootstrapRequest, log: &TaskLog) -> Result<()> {
    let _guard = LocalMutex::acquire(&ctx.lock_path, ctx.lock_timeout)?;
    ensure!(!ctx.store.exists(), AlreadyClusteredSnafu);

    if ctx.store.authkey_exists() {
        log.append("reusing existing cluster key material");
    } else {
        log.append("generating cluster key material");
        let mut key = vec![0u8; AUTHKEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        ctx.store.write_authkey(&key).map_err(ClusterError::from_store)?;
    }

    log.append(format!("creating cluster '{}'", req.cluster_name));
    let mut totem = TotemConfig::new(&req.cluster_name);
    totem.interfaces.insert(
        0,
        TotemInterface {
            linknumber: 0,
            knet_link_priority: req.link0.as_ref().and_then(|l| l.priority),
        },
    );
    if let Some(link1) = &req.link1 {
        totem
            .interfaces
            .insert(1, TotemInterface { linknumber: 1, knet_link_priority: link1.priority });
    }

    let mut links = BTreeMap::new();
    links.insert(
        0,
        req.link0.as_ref().map_or_else(|| ctx.local_node.clone(), |l| l.address.clone()),
    );
    if let Some(link1) = &req.link1 {
        links.insert(1, link1.address.clone());
    }

    let mut doc = ClusterConfigDocument::new(totem);
    doc.nodelist.insert(
        ctx.local_node.clone(),
        NodeEntry {
            name: ctx.local_node.clone(),
            nodeid: req.nodeid.unwrap_or(1),
            quorum_votes: req.votes.unwrap_or(1),
            links,
        },
    );

    ctx.store.write(&doc, None).map_err(ClusterError::from_store)?;
    log.append("wrote initial cluster configuration");

    if let Err(e) = ctx.trust.merge_node(&ctx.local_node) {
        warn!(node = %ctx.local_node, error = %e, "Host-key trust merge failed");
        log.append(format!("warning: could not merge own trust material: {e}"));
    }

    restart_services(ctx, log)
}

/// Joins an existing cluster through `gateway`.
pub fn join_existing(
    ctx: &ClusterContext,
    gateway: &dyn JoinGateway,
    req: &JoinRequest,
    log: &TaskLog,
) -> Result<()> {
    let _guard = LocalMutex::acquire(&ctx.lock_path, ctx.lock_timeout)?;
    ensure!(!ctx.store.exists(), AlreadyClusteredSnafu);

    log.append(format!("authenticating to '{}'", req.hostname));
    gateway.authenticate(&req.credential, &req.fingerprint)?;

    let info = gateway.join_info()?;
    log.append(format!(
        "joining cluster '{}' via node '{}'",
        info.totem.cluster_name, info.preferred_node
    ));

    let add_req = AddNodeRequest {
        nodeid: req.nodeid,
        votes: req.votes,
        force: req.force,
        link0: req.link0.clone(),
        link1: req.link1.clone(),
    };
    let outcome = gateway.add_node(&ctx.local_node, &add_req)?;
    for warning in &outcome.warnings {
        log.append(format!("warning from cluster side: {warning}"));
    }

    let key = hex::decode(&outcome.authkey).map_err(|e| ClusterError::Io {
        context: "decoding received key material".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    ctx.store.write_authkey(&key).map_err(ClusterError::from_store)?;
    ctx.store.write(&outcome.config, None).map_err(ClusterError::from_store)?;
    log.append("installed cluster configuration and key material");

    // Trust the existing members the same way they now trust us.
    for node in outcome.config.nodelist.keys() {
        if node != &ctx.local_node {
            if let Err(e) = ctx.trust.merge_node(node) {
                warn!(node = %node, error = %e, "Host-key trust merge failed");
                log.append(format!("warning: could not merge trust material for '{node}': {e}"));
            }
        }
    }

    restart_services(ctx, log)
}

fn restart_services(ctx: &ClusterContext, log: &TaskLog) -> Result<()> {
    log.append("restarting cluster services");
    match ctx.comm.restart_services() {
        Ok(()) => {
            log.append("cluster services restarted");
            Ok(())
        },
        Err(e) => ServiceRestartSnafu { reason: e.to_string() }.fail(),
    }
}
