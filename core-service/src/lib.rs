//! Core service façade and bootstrap helpers.
//!
//! This crate wires a [`CoreConfig`] and the host-provided capabilities
//! (token access and the target-side item adder) into a ready
//! [`SyncEngine`]. Hosts register their service providers on the returned
//! [`CoreService`] and then start it.
//!
//! Logging is left to the host; call
//! [`core_runtime::logging::init_logging`] with `config.logging` first if the
//! process has no subscriber yet.

pub mod error;

pub use error::{CoreError, Result};

pub use core_auth::{OAuthManager, OAuthTokens, TokenVault, UserServiceRef};
pub use core_matching::{SyncType, UniversalItem};
pub use core_runtime::config::{CoreConfig, ResultRetention, SyncSettings};
pub use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
pub use core_sync::{
    CrossServiceSyncResult, ItemAdder, ServiceProvider, ServicePair, SyncEngine, SyncJobId,
    SyncJobRequest, SyncMode, SyncOptions,
};

use core_runtime::logging::strip_path;
use core_sync::{ServiceRegistry, SqliteMetadataStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    engine: Arc<SyncEngine>,
}

impl CoreService {
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        self.engine.registry()
    }

    pub fn events(&self) -> &EventBus {
        self.engine.events()
    }

    /// Make a service available to sync jobs.
    pub async fn register_service(&self, provider: Arc<dyn ServiceProvider>) -> Result<()> {
        self.engine.registry().register(provider).await?;
        Ok(())
    }

    /// Start the engine's workers and scheduler under `ctx`.
    pub async fn start(&self, ctx: CancellationToken) -> Result<()> {
        self.engine.start(ctx).await?;
        Ok(())
    }

    /// Stop the engine, letting in-flight jobs finish.
    pub async fn stop(&self) -> Result<()> {
        self.engine.stop().await?;
        Ok(())
    }
}

/// Build a [`CoreService`] from configuration.
///
/// Connects the SQLite metadata store named by `config.database_url`,
/// creates its schema and builds an engine with an empty service registry.
///
/// ```no_run
/// # async fn example(adder: std::sync::Arc<dyn core_service::ItemAdder>) -> core_service::Result<()> {
/// use core_service::{bootstrap, CoreConfig, TokenVault};
/// use std::sync::Arc;
///
/// let config = CoreConfig::builder()
///     .database_url("sqlite://tunesync.db")
///     .build()?;
/// let core = bootstrap(config, Arc::new(TokenVault::new()), adder).await?;
/// # Ok(())
/// # }
/// ```
pub async fn bootstrap(
    config: CoreConfig,
    oauth: Arc<dyn OAuthManager>,
    adder: Arc<dyn ItemAdder>,
) -> Result<CoreService> {
    config.validate()?;

    let store = SqliteMetadataStore::connect(&config.database_url)
        .await
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
    store
        .initialize()
        .await
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

    let engine = SyncEngine::builder()
        .registry(Arc::new(ServiceRegistry::new()))
        .oauth(oauth)
        .adder(adder)
        .store(Arc::new(store))
        .events(EventBus::new(config.event_buffer_size))
        .settings(config.sync.clone())
        .build()?;

    info!(
        database = strip_path(&config.database_url),
        manual_workers = config.sync.manual_workers,
        auto_workers = config.sync.auto_workers,
        "Core service bootstrapped"
    );

    Ok(CoreService {
        config: Arc::new(config),
        engine: Arc::new(engine),
    })
}
