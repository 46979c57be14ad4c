//! Error taxonomy for clusterd.
//!
//! [`ClusterError`] is the user-facing taxonomy: every membership operation
//! either returns its typed result or one of these variants with a
//! human-readable message. [`StoreError`] covers the configuration-store
//! layer and is wrapped by [`ClusterError::Store`] except where a store
//! condition has a more precise cluster-level meaning (a missing document is
//! `NotClustered`, a store lock timeout is `LockTimeout`).

use std::{io, path::PathBuf, time::Duration};

use snafu::Snafu;

use crate::validation::ConfigReport;

/// Unified result type for membership operations.
pub type Result<T, E = ClusterError> = std::result::Result<T, E>;

/// Errors surfaced by membership operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClusterError {
    /// Bootstrap or join attempted on a node that already has a cluster
    /// configuration.
    #[snafu(display("this node is already part of a cluster"))]
    AlreadyClustered,

    /// A local or cluster-wide lock could not be acquired in time.
    #[snafu(display("timed out after {timeout:?} waiting for lock '{name}'"))]
    LockTimeout {
        /// Lock name or path.
        name: String,
        /// The bounded wait that expired.
        timeout: Duration,
    },

    /// The current document failed validation before the edit.
    ///
    /// Takes precedence over any later-detected failure in the same call:
    /// pre-existing corruption is reported first.
    #[snafu(display("cluster configuration is invalid: {report}"))]
    InvalidConfig {
        /// Structured per-item errors and warnings.
        report: ConfigReport,
    },

    /// A supplied link address is already used by another member.
    #[snafu(display("address '{address}' on link {link} is already used by node '{holder}'"))]
    DuplicateAddress {
        /// The colliding address.
        address: String,
        /// Link number the collision is on.
        link: u8,
        /// Member currently holding the address.
        holder: String,
    },

    /// Supplied links do not match the cluster's totem interfaces.
    #[snafu(display("link {link} mismatch: {reason}"))]
    LinkMismatch {
        /// Link number in question.
        link: u8,
        /// What did not line up.
        reason: String,
    },

    /// The node name is already in the nodelist and the request is not an
    /// idempotent forced re-add.
    #[snafu(display("node '{name}' is already a cluster member"))]
    NodeAlreadyExists {
        /// The conflicting node name.
        name: String,
    },

    /// A node may not remove itself from the cluster.
    #[snafu(display("refusing removal of the local node '{name}'"))]
    SelfRemoval {
        /// The local node name.
        name: String,
    },

    /// The caller does not currently observe cluster quorum.
    #[snafu(display("cluster does not have quorum; refusing membership change"))]
    NoQuorum,

    /// No member matches the given name or link address.
    #[snafu(display("no cluster member matches '{identifier}'"))]
    UnknownNode {
        /// The identifier that failed to resolve.
        identifier: String,
    },

    /// The operation requires an existing cluster configuration.
    #[snafu(display("this node is not part of a cluster"))]
    NotClustered,

    /// The join target rejected the supplied credential.
    #[snafu(display("authentication to '{host}' failed: {reason}"))]
    AuthenticationFailed {
        /// The join target.
        host: String,
        /// Why the credential was rejected.
        reason: String,
    },

    /// The join target's identity does not match the expected fingerprint.
    #[snafu(display("fingerprint mismatch: expected {expected}, remote reports {actual}"))]
    FingerprintMismatch {
        /// Fingerprint the caller supplied.
        expected: String,
        /// Fingerprint the remote actually presented.
        actual: String,
    },

    /// The quorum-witness helper socket could not be queried.
    #[snafu(display("quorum witness helper is unavailable: {source}"))]
    WitnessUnavailable {
        /// The underlying connection or read error.
        source: io::Error,
    },

    /// Restarting cluster services after a configuration change failed.
    #[snafu(display("failed to restart cluster services: {reason}"))]
    ServiceRestart {
        /// Command or unit that failed.
        reason: String,
    },

    /// Configuration-store failure without a more precise mapping.
    #[snafu(display("configuration store error: {source}"))]
    Store {
        /// The underlying store error.
        source: StoreError,
    },

    /// Filesystem I/O failure outside the store.
    #[snafu(display("{context}: {source}"))]
    Io {
        /// What was being done.
        context: String,
        /// The underlying I/O error.
        source: io::Error,
    },
}

impl ClusterError {
    /// Lifts a store error to the cluster taxonomy.
    ///
    /// A missing document means the node is not clustered, and a store lock
    /// timeout is a membership lock timeout; everything else is wrapped.
    pub fn from_store(source: StoreError) -> Self {
        match source {
            StoreError::DocumentMissing => Self::NotClustered,
            StoreError::LockTimeout { name, timeout } => Self::LockTimeout { name, timeout },
            other => Self::Store { source: other },
        }
    }
}

/// Errors from the configuration-store layer.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[snafu(context(suffix(StoreSnafu)))]
pub enum StoreError {
    /// The cluster configuration document does not exist yet.
    #[snafu(display("cluster configuration document does not exist"))]
    DocumentMissing,

    /// A named ancillary file (e.g. the authkey) is missing.
    #[snafu(display("{what} not found in configuration store"))]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// A cluster-wide named lock could not be acquired in time.
    #[snafu(display("timed out after {timeout:?} waiting for store lock '{name}'"))]
    LockTimeout {
        /// The named lock.
        name: String,
        /// The bounded wait that expired.
        timeout: Duration,
    },

    /// Filesystem I/O failure.
    #[snafu(display("I/O error on {}: {source}", path.display()))]
    Io {
        /// Path the operation touched.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// Document could not be serialized for persistence.
    #[snafu(display("failed to serialize configuration document: {source}"))]
    Serialize {
        /// The underlying TOML error.
        source: toml::ser::Error,
    },

    /// Persisted document could not be parsed.
    #[snafu(display("failed to parse configuration document at {}: {source}", path.display()))]
    Parse {
        /// Path of the unparsable document.
        path: PathBuf,
        /// The underlying TOML error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_from_store_maps_missing_document() {
        let err = ClusterError::from_store(StoreError::DocumentMissing);
        assert!(matches!(err, ClusterError::NotClustered));
    }

    #[test]
    fn test_from_store_maps_lock_timeout() {
        let err = ClusterError::from_store(StoreError::LockTimeout {
            name: "membership".to_string(),
            timeout: Duration::from_secs(10),
        });
        match err {
            ClusterError::LockTimeout { name, timeout } => {
                assert_eq!(name, "membership");
                assert_eq!(timeout, Duration::from_secs(10));
            },
            other => panic!("expected LockTimeout, got {other:?}"),
        }
    }

    #[test]
    fn test_from_store_wraps_other_errors() {
        let err = ClusterError::from_store(StoreError::NotFound { what: "authkey".to_string() });
        assert!(matches!(err, ClusterError::Store { .. }));
    }

    #[test]
    fn test_display_messages_are_actionable() {
        let err = ClusterError::DuplicateAddress {
            address: "10.0.0.2".to_string(),
            link: 0,
            holder: "alpha".to_string(),
        };
        assert_eq!(err.to_string(), "address '10.0.0.2' on link 0 is already used by node 'alpha'");

        let err = ClusterError::NoQuorum;
        assert!(err.to_string().contains("quorum"));
    }
}
