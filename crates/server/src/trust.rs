//! Host-key trust material handling.
//!
//! Key distribution itself is an external concern; provisioning drops each
//! node's public host keys into the trust directory, and clusterd merges
//! them into the shared known-hosts file when the node becomes a member.
//! Merge failures never fail a membership edit - they are collected as
//! warnings on the success value.

use std::{fs, io, path::PathBuf};

use sha2::{Digest as _, Sha256};
use tracing::debug;

/// Access to cluster trust material.
pub trait TrustStore: Send + Sync {
    /// Merges `node`'s host keys into the shared trust store.
    ///
    /// Best-effort by contract: callers log failures and continue.
    fn merge_node(&self, node: &str) -> io::Result<()>;

    /// Fingerprint of `node`'s trusted host keys, if any are known.
    fn fingerprint(&self, node: &str) -> Option<String>;
}

/// File-backed [`TrustStore`].
///
/// Layout under the trust directory (shared through the replicated store
/// root on real deployments):
///
/// ```text
/// <dir>/keys/<node>.pub    host keys staged by provisioning
/// <dir>/known_hosts        merged "node key" lines, one per key
/// ```
pub struct FileTrustStore {
    dir: PathBuf,
}

impl FileTrustStore {
    /// Creates a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn staged_key_path(&self, node: &str) -> PathBuf {
        self.dir.join("keys").join(format!("{node}.pub"))
    }

    fn known_hosts_path(&self) -> PathBuf {
        self.dir.join("known_hosts")
    }

    fn known_lines(&self) -> Vec<String> {
        match fs::read_to_string(self.known_hosts_path()) {
            Ok(text) => text.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl TrustStore for FileTrustStore {
    fn merge_node(&self, node: &str) -> io::Result<()> {
        let staged = fs::read_to_string(self.staged_key_path(node))?;
        let mut lines = self.known_lines();

        let mut added = 0;
        for key in staged.lines().map(str::trim).filter(|k| !k.is_empty()) {
            let line = format!("{node} {key}");
            if !lines.contains(&line) {
                lines.push(line);
                added += 1;
            }
        }

        fs::create_dir_all(&self.dir)?;
        fs::write(self.known_hosts_path(), lines.join("\n") + "\n")?;
        debug!(node, added, "Merged host keys into shared trust store");
        Ok(())
    }

    fn fingerprint(&self, node: &str) -> Option<String> {
        let prefix = format!("{node} ");
        let mut keys: Vec<String> = self
            .known_lines()
            .into_iter()
            .filter(|l| l.starts_with(&prefix))
            .collect();
        if keys.is_empty() {
            return None;
        }
        keys.sort();

        let mut hasher = Sha256::new();
        for key in keys {
            hasher.update(key.as_bytes());
            hasher.update(b"\n");
        }
        Some(hex::encode(hasher.finalize()))
    }
}
