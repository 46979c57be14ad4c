//! Daemon configuration.
//!
//! Loaded from a TOML file with environment overrides (`CLUSTERD__` prefix,
//! `__` as the nesting separator). Paths default to the standard system
//! locations; tests point everything into a temp directory via
//! [`DaemonConfig::for_test`].

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

/// Configuration of one clusterd node.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// This node's canonical name in the cluster.
    pub node_name: String,
    /// Root of the replicated configuration store.
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,
    /// Host-local membership lock file.
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
    /// Status socket of the quorum-device helper.
    #[serde(default = "default_qdevice_socket")]
    pub qdevice_socket: PathBuf,
    /// Bounded wait for local and cluster-wide lock acquisition.
    #[serde(default = "default_lock_timeout", with = "humantime_serde")]
    pub lock_timeout: Duration,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("/etc/clusterd")
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("/run/clusterd/membership.lock")
}

fn default_qdevice_socket() -> PathBuf {
    PathBuf::from("/run/clusterd/qdevice.sock")
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(10)
}

impl DaemonConfig {
    /// Loads configuration from `path` (or the default locations) plus
    /// environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let builder = config::Config::builder();

        let builder = if let Some(path) = path {
            builder.add_source(config::File::with_name(path))
        } else {
            builder.add_source(config::File::with_name("/etc/clusterd/clusterd").required(false))
        };

        let builder = builder.add_source(
            config::Environment::with_prefix("CLUSTERD").separator("__").try_parsing(true),
        );

        builder
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Directory holding trust material, under the replicated store root so
    /// every member sees the same view.
    pub fn trust_dir(&self) -> PathBuf {
        self.store_root.join("trust")
    }

    /// Configuration rooted in a test directory.
    pub fn for_test(node_name: &str, root: &std::path::Path) -> Self {
        Self {
            node_name: node_name.to_string(),
            store_root: root.join("store"),
            lock_file: root.join("membership.lock"),
            qdevice_socket: root.join("qdevice.sock"),
            lock_timeout: Duration::from_secs(2),
        }
    }
}

/// Duration deserialization in humantime format ("10s", "1m30s").
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to load configuration sources.
    Load(String),
    /// Loaded configuration did not deserialize.
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Load(msg) => write!(f, "failed to load config: {msg}"),
            ConfigError::Parse(msg) => write!(f, "failed to parse config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
