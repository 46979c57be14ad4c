//! Quorum-witness status monitor.
//!
//! An external quorum-device helper may run next to the daemon and expose a
//! status socket. Absence of the socket means no witness is configured and
//! is not an error; a connection or read failure is
//! [`ClusterError::WitnessUnavailable`]. One fixed query, no retry.

use std::{collections::BTreeMap, path::PathBuf};

use clusterd_types::{Result, error::WitnessUnavailableSnafu};
use snafu::ResultExt;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
};
use tracing::debug;

/// Status fields surfaced to callers; everything else the helper prints is
/// dropped.
pub const STATUS_FIELDS: &[&str] = &[
    "Algorithm",
    "Echo reply",
    "Last poll time",
    "Model",
    "State",
    "Tie-breaker",
    "Witness host",
];

/// The fixed status query sent to the helper.
const STATUS_QUERY: &[u8] = b"status\n";

/// Client for the quorum-device helper's status socket.
pub struct QdeviceMonitor {
    socket_path: PathBuf,
}

impl QdeviceMonitor {
    /// Monitors the helper socket at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    /// Fetches the witness status snapshot.
    ///
    /// Returns an empty map when the socket does not exist (no witness
    /// device configured).
    pub async fn status(&self) -> Result<BTreeMap<String, String>> {
        if !self.socket_path.exists() {
            debug!(path = %self.socket_path.display(), "No witness status socket; no device configured");
            return Ok(BTreeMap::new());
        }

        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .context(WitnessUnavailableSnafu)?;
        stream.write_all(STATUS_QUERY).await.context(WitnessUnavailableSnafu)?;
        stream.shutdown().await.context(WitnessUnavailableSnafu)?;

        let mut text = String::new();
        stream.read_to_string(&mut text).await.context(WitnessUnavailableSnafu)?;
        Ok(parse_status(&text))
    }
}

/// Parses the helper's `key : value` lines.
///
/// Continuation/detail lines (leading whitespace) and keys outside
/// [`STATUS_FIELDS`] are dropped.
pub fn parse_status(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for line in text.lines() {
        if line.starts_with([' ', '\t']) {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if STATUS_FIELDS.contains(&key) {
            fields.insert(key.to_string(), value.trim().to_string());
        }
    }
    fields
}
