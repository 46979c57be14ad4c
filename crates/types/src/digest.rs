//! Content fingerprints for the configuration document.
//!
//! A [`Digest`] is the SHA-256 of the document's canonical TOML
//! serialization. It is captured on every store read and passed back on
//! write so concurrent modification can be detected.

use std::fmt;

use sha2::{Digest as _, Sha256};

use crate::document::ClusterConfigDocument;

/// SHA-256 content fingerprint, displayed as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Fingerprints raw bytes.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    /// Fingerprints a document via its canonical TOML serialization.
    ///
    /// The transient `digest` field is `#[serde(skip)]`, so the fingerprint
    /// covers only persisted content.
    pub fn of_document(doc: &ClusterConfigDocument) -> Result<Self, toml::ser::Error> {
        Ok(Self::of_bytes(toml::to_string(doc)?.as_bytes()))
    }

    /// Lowercase hex rendering.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}
