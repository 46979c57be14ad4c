//! Configuration store client for clusterd.
//!
//! The cluster shares one configuration document through a replicated store
//! that behaves like a distributed filesystem with per-file cluster-wide
//! locking. This crate models that collaborator as the [`ConfigStore`] trait:
//!
//! - versioned document reads (every read captures a content [`Digest`])
//! - document writes carrying the expected digest for concurrency detection
//! - a cluster-wide named-lock primitive ([`ConfigStore::lock`])
//! - access to the shared authkey material
//!
//! Two backends ship in-repo: [`FileStore`] for production deployments (the
//! store root sits on the replicated filesystem) and [`MemoryStore`] for
//! tests and embedding.
//!
//! [`Digest`]: clusterd_types::Digest

#![deny(unsafe_code)]

mod client;
mod file;
mod memory;

pub use client::{ConfigStore, StoreLock};
pub use file::FileStore;
pub use memory::MemoryStore;
