//! # Authentication Module
//!
//! Token capability consumed by the sync engine.
//!
//! ## Overview
//!
//! The sync engine never runs OAuth flows itself. It asks an
//! [`OAuthManager`] for the tokens a user holds on a given service and hands
//! them to service adapters. This crate defines that capability, the token
//! types that cross it, and [`TokenVault`], an in-memory implementation for
//! single-process hosts and tests.
//!
//! ## Features
//!
//! - Redacted `Debug` output for tokens so they never reach logs
//! - Expiry checks with a refresh buffer
//! - Thread-safe vault keyed by `(user, service)`

pub mod error;
pub mod manager;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::{OAuthManager, TokenVault};
pub use types::{OAuthTokens, UserServiceRef};
