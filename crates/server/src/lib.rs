//! clusterd server library.
//!
//! Coordinates membership changes for a small compute cluster sharing a
//! replicated configuration store and a totem-style group-communication
//! layer. The crate provides the locking discipline that makes membership
//! edits atomic cluster-wide, the node add/remove/bootstrap/join protocol,
//! and the quorum-witness status query.

#![deny(unsafe_code)]

pub mod api;
pub mod comm;
pub mod config;
pub mod context;
pub mod gateway;
pub mod local_lock;
pub mod membership;
pub mod orchestrator;
pub mod qdevice;
pub mod registry;
pub mod tasks;
pub mod trust;
