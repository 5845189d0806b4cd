//! Bootstrap and façade tests against an in-memory store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_service::{
    bootstrap, CoreConfig, CoreError, ItemAdder, OAuthTokens, ServicePair, ServiceProvider,
    SyncJobRequest, SyncMode, SyncOptions, SyncSettings, SyncType, TokenVault, UniversalItem,
    UserServiceRef,
};
use core_sync::{RateLimit, ServiceItem, SyncError, UserDataResponse};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct StaticProvider {
    name: &'static str,
    items: Vec<ServiceItem>,
}

#[async_trait]
impl ServiceProvider for StaticProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn get_user_data(
        &self,
        _ctx: &CancellationToken,
        _tokens: &OAuthTokens,
        _since: Option<DateTime<Utc>>,
    ) -> core_sync::Result<UserDataResponse> {
        Ok(UserDataResponse::ok(self.items.clone()))
    }

    async fn health_check(&self) -> core_sync::Result<()> {
        Ok(())
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_second: 100,
            burst: 100,
        }
    }
}

#[derive(Default)]
struct CountingAdder {
    calls: AtomicUsize,
}

#[async_trait]
impl ItemAdder for CountingAdder {
    async fn add_item_to_service(
        &self,
        _ctx: &CancellationToken,
        _target_service: &str,
        _tokens: &OAuthTokens,
        _item: &UniversalItem,
        _options: &SyncOptions,
    ) -> core_sync::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn memory_config() -> CoreConfig {
    CoreConfig::builder()
        .database_url("sqlite::memory:")
        .event_buffer_size(16)
        .sync_settings(SyncSettings::default().with_item_delay(Duration::ZERO))
        .build()
        .unwrap()
}

async fn vault() -> Arc<TokenVault> {
    let vault = Arc::new(TokenVault::new());
    for service in ["spotify", "deezer"] {
        vault
            .store_tokens(
                UserServiceRef::new("user-1", service).unwrap(),
                OAuthTokens::new(format!("{service}-token"), None, 3600),
            )
            .await;
    }
    vault
}

#[tokio::test]
async fn test_bootstrap_runs_a_job_end_to_end() {
    let adder = Arc::new(CountingAdder::default());
    let core = bootstrap(memory_config(), vault().await, adder.clone())
        .await
        .unwrap();

    core.register_service(Arc::new(StaticProvider {
        name: "spotify",
        items: vec![ServiceItem::new(
            "sp-1",
            "saved_track",
            serde_json::json!({
                "id": "sp-1",
                "name": "Song",
                "duration_ms": 180_000,
                "artists": [{ "name": "Artist" }]
            }),
        )],
    }))
    .await
    .unwrap();
    core.register_service(Arc::new(StaticProvider {
        name: "deezer",
        items: Vec::new(),
    }))
    .await
    .unwrap();

    let request = SyncJobRequest::new("user-1", SyncType::Favorites).with_pair(
        ServicePair::new("spotify", "deezer", SyncMode::SyncFrom),
    );
    let result = core
        .engine()
        .process_sync_job(request, &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(adder.calls.load(Ordering::SeqCst), 1);

    let stored = core.engine().get_sync_result(&result.job_id).await.unwrap();
    assert_eq!(stored.total_synced, 1);
}

#[tokio::test]
async fn test_duplicate_registration_surfaces_sync_error() {
    let core = bootstrap(
        memory_config(),
        vault().await,
        Arc::new(CountingAdder::default()),
    )
    .await
    .unwrap();

    let provider = || {
        Arc::new(StaticProvider {
            name: "spotify",
            items: Vec::new(),
        })
    };
    core.register_service(provider()).await.unwrap();

    let err = core.register_service(provider()).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Sync(SyncError::ServiceAlreadyRegistered(_))
    ));
    assert_eq!(core.registry().len().await, 1);
}

#[tokio::test]
async fn test_start_and_stop_through_facade() {
    let core = bootstrap(
        memory_config(),
        vault().await,
        Arc::new(CountingAdder::default()),
    )
    .await
    .unwrap();

    core.start(CancellationToken::new()).await.unwrap();
    assert!(core.engine().is_running().await);
    assert!(matches!(
        core.start(CancellationToken::new()).await,
        Err(CoreError::Sync(SyncError::AlreadyRunning))
    ));
    core.stop().await.unwrap();
    assert!(!core.engine().is_running().await);
    assert_eq!(core.config().event_buffer_size, 16);
}

#[tokio::test]
async fn test_bootstrap_rejects_invalid_settings() {
    let mut config = memory_config();
    config.sync.manual_queue_capacity = 0;

    let result = bootstrap(config, vault().await, Arc::new(CountingAdder::default())).await;
    assert!(matches!(result, Err(CoreError::Runtime(ref e)) if e.is_config()));
}
