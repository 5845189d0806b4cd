//! # Service Registry
//!
//! Concurrent name → capability map. Each registered service gets its own
//! `governor` rate limiter built from [`ServiceProvider::rate_limit`].
//!
//! Reads vastly outnumber writes, so the map sits behind a `RwLock`. Handles
//! are cheap clones; callers never hold the lock across a network call.

use crate::provider::ServiceProvider;
use crate::{Result, SyncError};
use governor::{
    clock::DefaultClock, state::direct::NotKeyed, state::InMemoryState, Quota, RateLimiter,
};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A registered service together with its rate limiter
#[derive(Clone)]
pub struct ServiceHandle {
    provider: Arc<dyn ServiceProvider>,
    limiter: Arc<DirectRateLimiter>,
}

impl ServiceHandle {
    fn new(provider: Arc<dyn ServiceProvider>) -> Result<Self> {
        let limit = provider.rate_limit();
        let per_second = NonZeroU32::new(limit.requests_per_second).ok_or_else(|| {
            SyncError::InvalidRequest(format!(
                "service {} declares a zero request rate",
                provider.name()
            ))
        })?;
        let burst = NonZeroU32::new(limit.burst).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Ok(Self {
            provider,
            limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn provider(&self) -> &Arc<dyn ServiceProvider> {
        &self.provider
    }

    /// Wait for the service's rate limiter
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if `ctx` is cancelled first
    pub async fn wait_for_permit(&self, ctx: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(SyncError::Cancelled),
            _ = self.limiter.until_ready() => Ok(()),
        }
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("name", &self.provider.name())
            .field("category", &self.provider.category())
            .finish()
    }
}

/// Thread-safe registry of service capabilities
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceHandle>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under its own name
    ///
    /// # Errors
    ///
    /// - `ServiceAlreadyRegistered` if the name is taken
    /// - `InvalidRequest` if the name is empty or the rate limit is zero
    pub async fn register(&self, provider: Arc<dyn ServiceProvider>) -> Result<()> {
        let name = provider.name().to_string();
        if name.trim().is_empty() {
            return Err(SyncError::InvalidRequest(
                "service name is empty".to_string(),
            ));
        }

        let handle = ServiceHandle::new(provider)?;

        let mut services = self.services.write().await;
        if services.contains_key(&name) {
            return Err(SyncError::ServiceAlreadyRegistered(name));
        }
        services.insert(name.clone(), handle);
        drop(services);

        info!(service = %name, "Registered service");
        Ok(())
    }

    /// Remove a service, returning whether it was registered
    pub async fn unregister(&self, name: &str) -> bool {
        let removed = self.services.write().await.remove(name).is_some();
        if removed {
            info!(service = %name, "Unregistered service");
        }
        removed
    }

    /// # Errors
    ///
    /// Returns `ServiceNotFound` if no service has this name
    pub async fn get_service(&self, name: &str) -> Result<ServiceHandle> {
        self.services
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::ServiceNotFound(name.to_string()))
    }

    /// Whether `name` is registered, without probing it
    pub async fn contains(&self, name: &str) -> bool {
        self.services.read().await.contains_key(name)
    }

    /// Registered and passing its health check
    ///
    /// A failed health check does not remove the registration.
    pub async fn is_service_available(&self, name: &str) -> bool {
        let handle = match self.get_service(name).await {
            Ok(handle) => handle,
            Err(_) => return false,
        };

        match handle.provider().health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!(service = %name, error = %e, "Health check failed");
                false
            }
        }
    }

    /// Snapshot of registered names, order unspecified
    pub async fn list_services(&self) -> Vec<String> {
        self.services.read().await.keys().cloned().collect()
    }

    /// Snapshot of names in `category`, order unspecified
    pub async fn get_services_by_category(&self, category: &str) -> Vec<String> {
        let services = self.services.read().await;
        let names: Vec<String> = services
            .iter()
            .filter(|(_, handle)| handle.provider().category() == category)
            .map(|(name, _)| name.clone())
            .collect();
        debug!(category, count = names.len(), "Listed services by category");
        names
    }

    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }
}
