//! Core data model for clusterd.
//!
//! This crate holds the types shared by every other clusterd crate:
//!
//! - [`ClusterConfigDocument`] - the single shared membership document
//! - [`ClusterError`] / [`StoreError`] - the unified error taxonomy
//! - [`Digest`] - content fingerprint used for optimistic concurrency
//! - [`validation::verify_config`] - structural document validation
//!
//! The crate is deliberately free of I/O: documents are plain values here,
//! and the storage/locking discipline lives in `clusterd-store` and
//! `clusterd-server`.

#![deny(unsafe_code)]

pub mod digest;
pub mod document;
pub mod error;
pub mod validation;

pub use digest::Digest;
pub use document::{ClusterConfigDocument, LinkSpec, NodeEntry, TotemConfig, TotemInterface};
pub use error::{ClusterError, Result, StoreError};
pub use validation::{ConfigReport, verify_config};
