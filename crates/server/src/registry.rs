//! Node registry edits: add, remove, list.
//!
//! Each edit is one read-modify-write of the shared document, executed
//! inside the membership critical section (see [`crate::membership`]).
//! Validation failures abort before any mutation; pre-existing document
//! corruption is reported ahead of every other failure in the same call.

use std::collections::BTreeMap;

use clusterd_types::{
    ClusterConfigDocument, ClusterError, LinkSpec, NodeEntry, Result,
    error::{
        DuplicateAddressSnafu, InvalidConfigSnafu, LinkMismatchSnafu, NoQuorumSnafu,
        NodeAlreadyExistsSnafu, SelfRemovalSnafu, UnknownNodeSnafu,
    },
    verify_config,
};
use serde::{Deserialize, Serialize};
use snafu::ensure;
use tracing::{info, warn};

use crate::{context::ClusterContext, membership::with_membership_lock};

/// Parameters for adding a node to the cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddNodeRequest {
    /// Explicit node id; the smallest unused id is allocated when omitted.
    #[serde(default)]
    pub nodeid: Option<u32>,
    /// Vote weight; defaults to 1.
    #[serde(default)]
    pub votes: Option<u32>,
    /// Allows an idempotent re-add of an existing member when id and votes
    /// match exactly.
    #[serde(default)]
    pub force: bool,
    /// Ring-0 link; defaults to the node's own name when the cluster has a
    /// link-0 interface.
    #[serde(default)]
    pub link0: Option<LinkSpec>,
    /// Ring-1 link; mandatory iff the cluster has a link-1 interface.
    #[serde(default)]
    pub link1: Option<LinkSpec>,
}

/// Successful outcome of an add-node edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNodeOutcome {
    /// Shared secret key material, hex-encoded for transport.
    pub authkey: String,
    /// The full updated configuration document.
    pub config: ClusterConfigDocument,
    /// Non-fatal findings: validation warnings plus best-effort side effects
    /// that failed.
    pub warnings: Vec<String>,
}

/// Adds (or idempotently re-adds) a member.
pub fn add_node(ctx: &ClusterContext, name: &str, req: &AddNodeRequest) -> Result<AddNodeOutcome> {
    with_membership_lock(ctx, |mut doc| {
        // Corruption in the existing document outranks every later check.
        let report = verify_config(&doc);
        ensure!(report.is_ok(), InvalidConfigSnafu { report });
        let mut warnings = report.warnings;

        let supplied = [(0u8, req.link0.as_ref()), (1u8, req.link1.as_ref())];
        for (link, spec) in supplied.iter().filter_map(|(l, s)| s.map(|s| (*l, s))) {
            if let Some(holder) = doc.holder_of_address(link, &spec.address, Some(name)) {
                return DuplicateAddressSnafu {
                    address: spec.address.clone(),
                    link,
                    holder: holder.name.clone(),
                }
                .fail();
            }
        }

        let link0 = match (&req.link0, doc.totem.has_link(0)) {
            (Some(spec), _) => Some(spec.clone()),
            (None, true) => Some(LinkSpec::address(name)),
            (None, false) => None,
        };
        ensure!(
            !(req.link1.is_some() && !doc.totem.has_link(1)),
            LinkMismatchSnafu { link: 1u8, reason: "cluster has no link 1 interface" }
        );
        ensure!(
            !(doc.totem.has_link(1) && req.link1.is_none()),
            LinkMismatchSnafu { link: 1u8, reason: "cluster defines a link 1 interface; link1 address required" }
        );

        if let Some(existing) = doc.nodelist.get(name) {
            let exact_match = req.nodeid == Some(existing.nodeid)
                && req.votes == Some(existing.quorum_votes);
            ensure!(req.force && exact_match, NodeAlreadyExistsSnafu { name });

            info!(node = name, nodeid = existing.nodeid, "Forced re-add of existing member");
            let authkey = read_authkey_hex(ctx)?;
            return Ok(AddNodeOutcome { authkey, config: doc, warnings });
        }

        // Allocation must stay inside the critical section: the scan is only
        // safe against the document this lock holder read.
        let nodeid = req.nodeid.unwrap_or_else(|| doc.next_free_nodeid());
        let quorum_votes = req.votes.unwrap_or(1);

        if let Err(e) = ctx.trust.merge_node(name) {
            warn!(node = name, error = %e, "Host-key trust merge failed");
            warnings.push(format!("could not merge trust material for '{name}': {e}"));
        }

        let mut links = BTreeMap::new();
        if let Some(spec) = link0 {
            links.insert(0, spec.address);
        }
        if let Some(spec) = &req.link1 {
            links.insert(1, spec.address.clone());
        }
        doc.nodelist.insert(
            name.to_string(),
            NodeEntry { name: name.to_string(), nodeid, quorum_votes, links },
        );
        doc.bump_config_version();

        let expected = doc.digest;
        ctx.store.write(&doc, expected.as_ref()).map_err(ClusterError::from_store)?;
        info!(node = name, nodeid, votes = quorum_votes, "Added cluster member");

        let authkey = read_authkey_hex(ctx)?;
        Ok(AddNodeOutcome { authkey, config: doc, warnings })
    })
}

/// Removes a member identified by name or by any configured link address.
pub fn remove_node(ctx: &ClusterContext, identifier: &str) -> Result<()> {
    with_membership_lock(ctx, |mut doc| {
        ensure!(identifier != ctx.local_node, SelfRemovalSnafu { name: identifier });

        // A partitioned minority must not unilaterally shrink membership.
        ensure!(ctx.comm.quorate(), NoQuorumSnafu);

        let target = doc
            .resolve(identifier)
            .map(|n| (n.name.clone(), n.nodeid))
            .ok_or_else(|| UnknownNodeSnafu { identifier }.build())?;
        let (target_name, target_id) = target;
        ensure!(target_name != ctx.local_node, SelfRemovalSnafu { name: target_name });

        doc.nodelist.remove(&target_name);
        doc.bump_config_version();
        let expected = doc.digest;
        ctx.store.write(&doc, expected.as_ref()).map_err(ClusterError::from_store)?;
        info!(node = %target_name, nodeid = target_id, "Removed cluster member");

        // Live eviction is best-effort once the document write succeeded.
        if let Err(e) = ctx.comm.evict_node(target_id) {
            warn!(node = %target_name, nodeid = target_id, error = %e,
                "Could not evict removed node from the communication ring");
        }
        Ok(())
    })
}

/// Lists members from a consistent document read; takes no membership lock.
pub fn list_nodes(ctx: &ClusterContext) -> Result<Vec<NodeEntry>> {
    let doc = ctx.store.read().map_err(ClusterError::from_store)?;
    Ok(doc.nodelist.into_values().collect())
}

fn read_authkey_hex(ctx: &ClusterContext) -> Result<String> {
    ctx.store.read_authkey().map(hex::encode).map_err(ClusterError::from_store)
}
