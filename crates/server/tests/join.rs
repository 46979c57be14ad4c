//! Join protocol tests: gateway authentication, join-info, and the full
//! candidate-side sequence.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::{Arc, atomic::Ordering};

use clusterd_server::{
    api::ClusterApi,
    gateway::{JoinGateway, StoreGateway, build_join_info},
    orchestrator::{self, JoinRequest},
    tasks::{TaskLog, TaskState},
    trust::TrustStore,
};
use clusterd_store::ConfigStore;
use clusterd_types::{ClusterError, Digest};
use common::{TestNode, seed, seeded_doc};

const JOIN_SECRET: &str = "s3kr1t";

/// An existing one-node cluster and a gateway into it.
fn cluster_and_gateway() -> (TestNode, Arc<StoreGateway>, String) {
    let cluster = TestNode::new("alpha");
    seed(&cluster, &seeded_doc("prod", &["alpha"]));

    let gateway =
        Arc::new(StoreGateway::new(cluster.ctx.clone(), "alpha", JOIN_SECRET));
    let fingerprint = gateway.cluster_fingerprint().unwrap();
    (cluster, gateway, fingerprint)
}

fn join_req(fingerprint: &str) -> JoinRequest {
    JoinRequest {
        hostname: "alpha".to_string(),
        credential: JOIN_SECRET.to_string(),
        fingerprint: fingerprint.to_string(),
        nodeid: None,
        votes: None,
        force: false,
        link0: Some("10.0.0.2".parse().unwrap()),
        link1: None,
    }
}

// =========================================================================
// Gateway authentication
// =========================================================================

#[test]
fn test_gateway_accepts_valid_credentials() {
    let (_cluster, gateway, fingerprint) = cluster_and_gateway();
    gateway.authenticate(JOIN_SECRET, &fingerprint).unwrap();
}

#[test]
fn test_gateway_rejects_bad_secret() {
    let (_cluster, gateway, fingerprint) = cluster_and_gateway();
    let err = gateway.authenticate("wrong", &fingerprint).unwrap_err();
    assert!(matches!(err, ClusterError::AuthenticationFailed { .. }));
}

#[test]
fn test_gateway_rejects_bad_fingerprint() {
    let (_cluster, gateway, _) = cluster_and_gateway();
    let err = gateway.authenticate(JOIN_SECRET, "deadbeef").unwrap_err();
    match err {
        ClusterError::FingerprintMismatch { expected, actual } => {
            assert_eq!(expected, "deadbeef");
            assert_eq!(actual, Digest::of_bytes(&[0xA5; 32]).to_hex());
        },
        other => panic!("expected FingerprintMismatch, got {other:?}"),
    }
}

// =========================================================================
// Join info
// =========================================================================

#[test]
fn test_join_info_augments_entries() {
    let cluster = TestNode::new("alpha");
    let mut doc = seeded_doc("prod", &["alpha", "beta"]);
    // beta has no ring-0 address: resolution falls back to the name.
    doc.nodelist.get_mut("beta").unwrap().links.clear();
    seed(&cluster, &doc);
    cluster.trust.merge_node("alpha").unwrap();

    let info = build_join_info(&cluster.ctx, None).unwrap();
    assert_eq!(info.preferred_node, "alpha");
    assert_eq!(info.totem.cluster_name, "prod");
    assert!(!info.config_digest.is_empty());

    let alpha = info.nodelist.iter().find(|n| n.entry.name == "alpha").unwrap();
    assert_eq!(alpha.address, "10.0.0.1");
    assert_eq!(alpha.fingerprint.as_deref(), Some("fp-alpha"));

    let beta = info.nodelist.iter().find(|n| n.entry.name == "beta").unwrap();
    assert_eq!(beta.address, "beta");
    assert!(beta.fingerprint.is_none());
}

#[test]
fn test_join_info_requires_cluster() {
    let lone = TestNode::new("alpha");
    let err = build_join_info(&lone.ctx, None).unwrap_err();
    assert!(matches!(err, ClusterError::NotClustered));
}

#[test]
fn test_join_info_rejects_unknown_preferred_node() {
    let cluster = TestNode::new("alpha");
    seed(&cluster, &seeded_doc("prod", &["alpha"]));

    let err = build_join_info(&cluster.ctx, Some("ghost")).unwrap_err();
    assert!(matches!(err, ClusterError::UnknownNode { .. }));
}

// =========================================================================
// JoinExisting
// =========================================================================

#[test]
fn test_join_existing_end_to_end() {
    let (cluster, gateway, fingerprint) = cluster_and_gateway();
    let candidate = TestNode::new("bravo");

    orchestrator::join_existing(
        &candidate.ctx,
        gateway.as_ref(),
        &join_req(&fingerprint),
        &TaskLog::default(),
    )
    .unwrap();

    // Cluster side gained the member.
    let cluster_doc = cluster.store.read().unwrap();
    assert!(cluster_doc.nodelist.contains_key("bravo"));
    assert_eq!(cluster_doc.nodelist["bravo"].nodeid, 2);
    assert_eq!(cluster_doc.nodelist["bravo"].links[&0], "10.0.0.2");

    // Candidate installed the document and key material.
    let local_doc = candidate.store.read().unwrap();
    assert_eq!(local_doc.nodelist.len(), 2);
    assert_eq!(candidate.store.read_authkey().unwrap(), cluster.store.read_authkey().unwrap());

    // Candidate now trusts the existing member and restarted its services.
    assert!(candidate.trust.merged.lock().contains(&"alpha".to_string()));
    assert_eq!(candidate.comm.restarts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_join_rejected_with_wrong_secret() {
    let (cluster, gateway, fingerprint) = cluster_and_gateway();
    let candidate = TestNode::new("bravo");

    let mut req = join_req(&fingerprint);
    req.credential = "wrong".to_string();
    let err = orchestrator::join_existing(
        &candidate.ctx,
        gateway.as_ref(),
        &req,
        &TaskLog::default(),
    )
    .unwrap_err();

    assert!(matches!(err, ClusterError::AuthenticationFailed { .. }));
    assert!(!candidate.store.exists(), "no partial state installed");
    assert!(!cluster.store.read().unwrap().nodelist.contains_key("bravo"));
}

#[test]
fn test_join_refused_when_already_clustered() {
    let (_cluster, gateway, fingerprint) = cluster_and_gateway();
    let candidate = TestNode::new("bravo");
    seed(&candidate, &seeded_doc("other", &["bravo"]));

    let err = orchestrator::join_existing(
        &candidate.ctx,
        gateway.as_ref(),
        &join_req(&fingerprint),
        &TaskLog::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ClusterError::AlreadyClustered));
}

#[test]
fn test_join_duplicate_address_propagates_from_cluster_side() {
    let (_cluster, gateway, fingerprint) = cluster_and_gateway();
    let candidate = TestNode::new("bravo");

    let mut req = join_req(&fingerprint);
    // alpha already holds 10.0.0.1 on ring 0.
    req.link0 = Some("10.0.0.1".parse().unwrap());
    let err = orchestrator::join_existing(
        &candidate.ctx,
        gateway.as_ref(),
        &req,
        &TaskLog::default(),
    )
    .unwrap_err();

    assert!(matches!(err, ClusterError::DuplicateAddress { .. }));
    assert!(!candidate.store.exists());
}

// =========================================================================
// Background task surface
// =========================================================================

#[tokio::test]
async fn test_join_as_background_task_succeeds() {
    let (cluster, gateway, fingerprint) = cluster_and_gateway();
    let candidate = TestNode::new("bravo");
    let api = ClusterApi::new(candidate.ctx.clone());

    let mut handle = api.join(gateway, join_req(&fingerprint));
    assert_eq!(handle.wait().await, TaskState::Succeeded);

    let log = handle.log().snapshot();
    assert!(log.iter().any(|l| l.contains("joining cluster 'prod'")));
    assert!(cluster.store.read().unwrap().nodelist.contains_key("bravo"));
}

#[tokio::test]
async fn test_failed_join_surfaces_through_task_state() {
    let (_cluster, gateway, fingerprint) = cluster_and_gateway();
    let candidate = TestNode::new("bravo");
    let api = ClusterApi::new(candidate.ctx.clone());

    let mut req = join_req(&fingerprint);
    req.credential = "wrong".to_string();
    let mut handle = api.join(gateway, req);

    match handle.wait().await {
        TaskState::Failed { message } => assert!(message.contains("authentication")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(handle.log().snapshot().iter().any(|l| l.contains("failed")));
}

#[tokio::test]
async fn test_bootstrap_as_background_task() {
    let node = TestNode::new("alpha");
    let api = ClusterApi::new(node.ctx.clone());

    let mut handle = api.create_cluster(clusterd_server::orchestrator::BootstrapRequest {
        cluster_name: "prod".to_string(),
        nodeid: None,
        votes: None,
        link0: None,
        link1: None,
    });
    assert_eq!(handle.wait().await, TaskState::Succeeded);
    assert!(node.store.exists());
}
