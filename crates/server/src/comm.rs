//! Group-communication daemon control.
//!
//! The daemon that computes quorum and distributes the live membership view
//! is an external collaborator; clusterd only queries it and nudges it after
//! configuration changes. [`GroupComm`] is the seam, [`ToolComm`] the
//! command-line-tool-backed implementation used on real hosts.

use std::{io, process::Command};

use tracing::{debug, warn};

/// Control interface to the group-communication layer.
pub trait GroupComm: Send + Sync {
    /// Whether this node currently observes cluster quorum.
    fn quorate(&self) -> bool;

    /// Tears down the communication ring of the given node id.
    ///
    /// Called after a node was removed from the document so the live view
    /// catches up without waiting for the next full reload.
    fn evict_node(&self, nodeid: u32) -> io::Result<()>;

    /// Restarts the config-store and group-communication services so a new
    /// document takes effect.
    fn restart_services(&self) -> io::Result<()>;
}

/// [`GroupComm`] implementation shelling out to the daemon's admin tools.
pub struct ToolComm {
    quorum_cmd: Vec<String>,
    evict_cmd: Vec<String>,
    restart_cmd: Vec<String>,
}

impl ToolComm {
    /// Uses explicit command lines; the node id is appended to `evict_cmd`.
    pub fn new(quorum_cmd: Vec<String>, evict_cmd: Vec<String>, restart_cmd: Vec<String>) -> Self {
        Self { quorum_cmd, evict_cmd, restart_cmd }
    }

    fn run(argv: &[String]) -> io::Result<()> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;
        debug!(command = %argv.join(" "), "Running group-communication tool");
        let status = Command::new(program).args(args).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("'{}' exited with {status}", argv.join(" "))))
        }
    }
}

impl Default for ToolComm {
    /// Standard corosync tooling.
    fn default() -> Self {
        let argv = |parts: &[&str]| parts.iter().map(ToString::to_string).collect();
        Self {
            quorum_cmd: argv(&["corosync-quorumtool", "-s"]),
            evict_cmd: argv(&["corosync-cfgtool", "-k"]),
            restart_cmd: argv(&["systemctl", "restart", "clusterd-store.service", "corosync.service"]),
        }
    }
}

impl GroupComm for ToolComm {
    fn quorate(&self) -> bool {
        match Self::run(&self.quorum_cmd) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Quorum query failed; treating node as inquorate");
                false
            },
        }
    }

    fn evict_node(&self, nodeid: u32) -> io::Result<()> {
        let mut argv = self.evict_cmd.clone();
        argv.push(nodeid.to_string());
        Self::run(&argv)
    }

    fn restart_services(&self) -> io::Result<()> {
        Self::run(&self.restart_cmd)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_quorate_follows_tool_exit_status() {
        let quorate = ToolComm::new(argv(&["true"]), argv(&["true"]), argv(&["true"]));
        assert!(quorate.quorate());

        let inquorate = ToolComm::new(argv(&["false"]), argv(&["true"]), argv(&["true"]));
        assert!(!inquorate.quorate());
    }

    #[test]
    fn test_evict_appends_node_id() {
        // `sh -c 'test "$1" = 3' eviction-check <nodeid>` succeeds only when
        // the appended argument is the node id.
        let comm = ToolComm::new(
            argv(&["true"]),
            argv(&["sh", "-c", "test \"$1\" = 3", "eviction-check"]),
            argv(&["true"]),
        );
        assert!(comm.evict_node(3).is_ok());
        assert!(comm.evict_node(4).is_err());
    }

    #[test]
    fn test_failed_restart_is_an_error() {
        let comm = ToolComm::new(argv(&["true"]), argv(&["true"]), argv(&["false"]));
        assert!(comm.restart_services().is_err());
    }

    #[test]
    fn test_missing_tool_is_an_error_not_a_panic() {
        let comm = ToolComm::new(
            argv(&["definitely-not-a-real-tool-7f3a"]),
            argv(&["true"]),
            argv(&["true"]),
        );
        assert!(!comm.quorate());
    }
}
