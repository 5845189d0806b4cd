//! Workspace placeholder crate.
//!
//! This crate forwards the `service` feature to `core-service` so host
//! applications can depend on `tunesync-workspace` and get a fully wired sync
//! engine without naming each workspace crate individually.

#[cfg(feature = "service")]
pub use core_service::*;
