//! Structural validation of the cluster configuration document.
//!
//! [`verify_config`] checks the document invariants and reports findings as
//! structured strings. Hard errors abort the membership edit that detected
//! them (reported before any other failure in the same call); warnings ride
//! along on the success value.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::document::ClusterConfigDocument;

/// Structured outcome of a document validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigReport {
    /// Invariant violations; any entry makes the document unusable.
    pub errors: Vec<String>,
    /// Findings worth surfacing that do not block an edit.
    pub warnings: Vec<String>,
}

impl ConfigReport {
    /// Whether the document passed without hard errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "{} warning(s)", self.warnings.len())
        } else {
            write!(f, "{}", self.errors.join("; "))
        }
    }
}

/// Validates the document invariants.
///
/// Errors:
/// - empty cluster name
/// - nodelist key differing from the entry's `name`
/// - `nodeid` below 1
/// - duplicate `nodeid`
/// - the same address configured on the same link of two nodes
///
/// Warnings:
/// - a node carrying zero quorum votes
/// - a node missing an address for a configured totem interface
pub fn verify_config(doc: &ClusterConfigDocument) -> ConfigReport {
    let mut report = ConfigReport::default();

    if doc.totem.cluster_name.is_empty() {
        report.errors.push("totem: cluster_name must not be empty".to_string());
    }

    let mut seen_ids: BTreeMap<u32, &str> = BTreeMap::new();
    let mut seen_addrs: BTreeMap<(u8, &str), &str> = BTreeMap::new();

    for (key, node) in &doc.nodelist {
        if key != &node.name {
            report
                .errors
                .push(format!("nodelist: entry '{key}' names itself '{}'", node.name));
        }

        if node.nodeid < 1 {
            report.errors.push(format!("node '{}': nodeid must be at least 1", node.name));
        } else if let Some(holder) = seen_ids.insert(node.nodeid, &node.name) {
            report.errors.push(format!(
                "node '{}': nodeid {} already used by node '{holder}'",
                node.name, node.nodeid
            ));
        }

        for (link, addr) in &node.links {
            if let Some(holder) = seen_addrs.insert((*link, addr), &node.name) {
                report.errors.push(format!(
                    "node '{}': address '{addr}' on link {link} already used by node '{holder}'",
                    node.name
                ));
            }
        }

        if node.quorum_votes == 0 {
            report.warnings.push(format!("node '{}' carries no quorum votes", node.name));
        }

        for link in doc.totem.interfaces.keys() {
            if !node.links.contains_key(link) {
                report.warnings.push(format!(
                    "node '{}' has no address for configured link {link}",
                    node.name
                ));
            }
        }
    }

    report
}
