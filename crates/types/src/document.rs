//! The shared cluster configuration document.
//!
//! One document describes the whole cluster: the totem transport settings and
//! the nodelist. It is persisted as TOML in the configuration store and only
//! ever edited inside a membership-lock critical section.
//!
//! Link addresses are kept as small integer-keyed maps (`links[0]` is the
//! ring-0 address, `links[1]` ring-1). TOML requires string map keys, so the
//! maps go through [`numbered`] on the wire.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// The singular shared membership document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfigDocument {
    /// Group-communication transport settings.
    pub totem: TotemConfig,
    /// Cluster members, keyed by node name.
    #[serde(default)]
    pub nodelist: BTreeMap<String, NodeEntry>,
    /// Content fingerprint captured at the last store read.
    ///
    /// Carried for optimistic-concurrency comparison on write; never
    /// serialized into the document itself.
    #[serde(skip)]
    pub digest: Option<Digest>,
}

impl ClusterConfigDocument {
    /// Creates a document with the given totem settings and no members.
    pub fn new(totem: TotemConfig) -> Self {
        Self { totem, nodelist: BTreeMap::new(), digest: None }
    }

    /// Returns the smallest positive node id not currently in use.
    ///
    /// Linear scan from 1 upward; deterministic for a given nodelist. Only
    /// meaningful when called on a document read inside the membership lock,
    /// since a concurrent edit could otherwise hand out the same id twice.
    pub fn next_free_nodeid(&self) -> u32 {
        let mut candidate = 1;
        while self.nodelist.values().any(|n| n.nodeid == candidate) {
            candidate += 1;
        }
        candidate
    }

    /// Finds the member using `address` on the given link, if any.
    ///
    /// `exclude` skips one node name, so a node's own addresses do not count
    /// as collisions when re-adding it.
    pub fn holder_of_address(
        &self,
        link: u8,
        address: &str,
        exclude: Option<&str>,
    ) -> Option<&NodeEntry> {
        self.nodelist
            .values()
            .filter(|n| exclude != Some(n.name.as_str()))
            .find(|n| n.links.get(&link).is_some_and(|a| a == address))
    }

    /// Resolves `identifier` to a member by exact name or by any configured
    /// link address.
    pub fn resolve(&self, identifier: &str) -> Option<&NodeEntry> {
        self.nodelist.get(identifier).or_else(|| {
            self.nodelist.values().find(|n| n.links.values().any(|a| a == identifier))
        })
    }

    /// Bumps the totem `config_version`.
    ///
    /// Every document write increments the version so the group-communication
    /// daemon reloads the newer configuration and never regresses.
    pub fn bump_config_version(&mut self) {
        self.totem.config_version += 1;
    }
}

/// Group-communication transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotemConfig {
    /// Cluster name, fixed at bootstrap.
    pub cluster_name: String,
    /// Monotonically increasing document version.
    #[serde(default = "default_config_version")]
    pub config_version: u64,
    /// Transport interfaces, keyed by link number.
    #[serde(default, with = "numbered::keyed")]
    pub interfaces: BTreeMap<u8, TotemInterface>,
}

impl TotemConfig {
    /// Creates totem settings for a new cluster with version 1 and no
    /// interfaces yet.
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            config_version: default_config_version(),
            interfaces: BTreeMap::new(),
        }
    }

    /// Whether a transport interface is configured for `link`.
    pub fn has_link(&self, link: u8) -> bool {
        self.interfaces.contains_key(&link)
    }
}

fn default_config_version() -> u64 {
    1
}

/// One transport interface of the totem layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotemInterface {
    /// Link number this interface serves.
    pub linknumber: u8,
    /// Optional knet link priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knet_link_priority: Option<u32>,
}

/// One cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Canonical node name.
    pub name: String,
    /// Stable positive node id.
    pub nodeid: u32,
    /// Vote weight in quorum calculations.
    #[serde(default = "default_quorum_votes")]
    pub quorum_votes: u32,
    /// Link addresses, keyed by link number.
    #[serde(default, with = "numbered::plain")]
    pub links: BTreeMap<u8, String>,
}

fn default_quorum_votes() -> u32 {
    1
}

/// A user-supplied link descriptor: address plus optional priority.
///
/// Ephemeral; exists only while a membership request is validated. Parsed
/// from the `address[,priority=N]` request form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// Address (or resolvable name) for this link.
    pub address: String,
    /// Optional knet link priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

impl LinkSpec {
    /// Creates a spec with just an address.
    pub fn address(address: impl Into<String>) -> Self {
        Self { address: address.into(), priority: None }
    }
}

/// Error parsing a [`LinkSpec`] from its request form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpecParseError {
    input: String,
}

impl fmt::Display for LinkSpecParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid link spec '{}'; expected 'address[,priority=N]'", self.input)
    }
}

impl std::error::Error for LinkSpecParseError {}

impl FromStr for LinkSpec {
    type Err = LinkSpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || LinkSpecParseError { input: s.to_string() };
        let mut parts = s.split(',');
        let address = parts.next().map(str::trim).filter(|a| !a.is_empty()).ok_or_else(err)?;
        let mut priority = None;
        for part in parts {
            let (key, value) = part.trim().split_once('=').ok_or_else(err)?;
            if key.trim() != "priority" {
                return Err(err());
            }
            priority = Some(value.trim().parse().map_err(|_| err())?);
        }
        Ok(Self { address: address.to_string(), priority })
    }
}

/// Serde adapters for integer-keyed maps in TOML.
///
/// TOML only allows string map keys, so `BTreeMap<u8, _>` round-trips through
/// a string-keyed map on the wire.
mod numbered {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};

    fn to_string_keys<T: Clone>(map: &BTreeMap<u8, T>) -> BTreeMap<String, T> {
        map.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn from_string_keys<'de, D, T>(raw: BTreeMap<String, T>) -> Result<BTreeMap<u8, T>, D::Error>
    where
        D: Deserializer<'de>,
    {
        raw.into_iter()
            .map(|(k, v)| {
                let num = k
                    .parse::<u8>()
                    .map_err(|_| D::Error::custom(format!("invalid link number '{k}'")))?;
                Ok((num, v))
            })
            .collect()
    }

    /// `BTreeMap<u8, String>` (link address maps).
    pub mod plain {
        use super::*;

        pub fn serialize<S: Serializer>(
            map: &BTreeMap<u8, String>,
            ser: S,
        ) -> Result<S::Ok, S::Error> {
            to_string_keys(map).serialize(ser)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            de: D,
        ) -> Result<BTreeMap<u8, String>, D::Error> {
            from_string_keys::<D, _>(BTreeMap::<String, String>::deserialize(de)?)
        }
    }

    /// `BTreeMap<u8, TotemInterface>`.
    pub mod keyed {
        use super::*;
        use crate::document::TotemInterface;

        pub fn serialize<S: Serializer>(
            map: &BTreeMap<u8, TotemInterface>,
            ser: S,
        ) -> Result<S::Ok, S::Error> {
            to_string_keys(map).serialize(ser)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            de: D,
        ) -> Result<BTreeMap<u8, TotemInterface>, D::Error> {
            from_string_keys::<D, _>(BTreeMap::<String, TotemInterface>::deserialize(de)?)
        }
    }
}
