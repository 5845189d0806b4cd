//! # Service Capabilities
//!
//! Traits the engine consumes for each external service. Adapters that talk
//! HTTP to a specific provider live outside this crate.

use crate::request::SyncOptions;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_auth::OAuthTokens;
use core_matching::{ItemAction, UniversalItem};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Default category for services that do not declare one
pub const DEFAULT_CATEGORY: &str = "music";

/// Outbound request budget for a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests_per_second: u32,
    /// Requests allowed back to back before pacing applies
    pub burst: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst: 10,
        }
    }
}

/// One record returned by a service, still in its native shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub external_id: String,
    /// Native item-type tag, e.g. `saved_track`
    pub item_type: String,
    pub action: ItemAction,
    pub data: serde_json::Value,
}

impl ServiceItem {
    pub fn new(
        external_id: impl Into<String>,
        item_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            item_type: item_type.into(),
            action: ItemAction::Create,
            data,
        }
    }
}

/// A user's data as returned by a service
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserDataResponse {
    pub success: bool,
    pub items: Vec<ServiceItem>,
    pub errors: Vec<String>,
}

impl UserDataResponse {
    pub fn ok(items: Vec<ServiceItem>) -> Self {
        Self {
            success: true,
            items,
            errors: Vec::new(),
        }
    }
}

/// Read side of an external service.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Registry name, e.g. `spotify`
    fn name(&self) -> &str;

    fn category(&self) -> &str {
        DEFAULT_CATEGORY
    }

    /// Fetch the user's items, optionally only those changed after `since`
    ///
    /// Implementations should abandon outstanding requests once `ctx` is
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the service could not be reached or rejected the
    /// request
    async fn get_user_data(
        &self,
        ctx: &CancellationToken,
        tokens: &OAuthTokens,
        since: Option<DateTime<Utc>>,
    ) -> Result<UserDataResponse>;

    /// Liveness check
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unhealthy
    async fn health_check(&self) -> Result<()>;

    fn rate_limit(&self) -> RateLimit {
        RateLimit::default()
    }
}

/// Write side: pushes a canonical item into a target service.
///
/// Implementations search the target with the request's match threshold and
/// apply its conflict policy. Adds are expected to be idempotent; the engine
/// gives at-least-once delivery.
#[async_trait]
pub trait ItemAdder: Send + Sync {
    /// Returning [`SyncError::Cancelled`](crate::SyncError::Cancelled) after
    /// `ctx` fires stops the remaining adds of the pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the target rejected the item
    async fn add_item_to_service(
        &self,
        ctx: &CancellationToken,
        target_service: &str,
        tokens: &OAuthTokens,
        item: &UniversalItem,
        options: &SyncOptions,
    ) -> Result<()>;
}
