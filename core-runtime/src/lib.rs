//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the sync core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the other workspace crates
//! depend on. It establishes the logging conventions, configuration defaults
//! and event broadcasting used by the sync engine.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
