//! Fakes shared by the engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_auth::{OAuthTokens, TokenVault, UserServiceRef};
use core_matching::UniversalItem;
use core_runtime::config::SyncSettings;
use core_sync::{
    ItemAdder, RateLimit, Result, ServiceItem, ServiceProvider, SqliteMetadataStore, SyncEngine,
    SyncError, SyncOptions, UserDataResponse,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Service provider
// ============================================================================

pub struct FakeProvider {
    name: String,
    category: String,
    response: AsyncMutex<Result<UserDataResponse>>,
    fetches: AtomicUsize,
}

impl FakeProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            category: "music".to_string(),
            response: AsyncMutex::new(Ok(UserDataResponse::ok(Vec::new()))),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn returning(self, items: Vec<ServiceItem>) -> Self {
        Self {
            response: AsyncMutex::new(Ok(UserDataResponse::ok(items))),
            ..self
        }
    }

    pub fn failing(self, message: &str) -> Self {
        Self {
            response: AsyncMutex::new(Err(SyncError::Provider(message.to_string()))),
            ..self
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> &str {
        &self.category
    }

    async fn get_user_data(
        &self,
        _ctx: &CancellationToken,
        _tokens: &OAuthTokens,
        _since: Option<DateTime<Utc>>,
    ) -> Result<UserDataResponse> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.response.lock().await.clone()
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_second: 1000,
            burst: 1000,
        }
    }
}

// ============================================================================
// Item adder
// ============================================================================

/// Records every add; can reject titles, slow down each call or hang until
/// the job is cancelled
#[derive(Default)]
pub struct RecordingAdder {
    added: AsyncMutex<Vec<(String, UniversalItem)>>,
    reject_titles: HashSet<String>,
    delay: Option<Duration>,
    hang: bool,
    pub started: Arc<Notify>,
    completed: AtomicUsize,
}

impl RecordingAdder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, title: &str) -> Self {
        self.reject_titles.insert(title.to_string());
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub async fn added(&self) -> Vec<(String, UniversalItem)> {
        self.added.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.added.lock().await.len()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemAdder for RecordingAdder {
    async fn add_item_to_service(
        &self,
        ctx: &CancellationToken,
        target_service: &str,
        _tokens: &OAuthTokens,
        item: &UniversalItem,
        _options: &SyncOptions,
    ) -> Result<()> {
        self.added
            .lock()
            .await
            .push((target_service.to_string(), item.clone()));
        self.started.notify_one();

        if self.hang {
            ctx.cancelled().await;
            return Err(SyncError::Cancelled);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.reject_titles.contains(&item.title) {
            return Err(SyncError::Provider(format!(
                "{target_service} rejected {}",
                item.title
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn spotify_track(id: &str, title: &str, artist: &str, item_type: &str) -> ServiceItem {
    ServiceItem::new(
        id,
        item_type,
        json!({
            "id": id,
            "name": title,
            "duration_ms": 200_000,
            "artists": [{ "name": artist }],
            "album": { "name": "Album" }
        }),
    )
}

pub fn deezer_track(id: u64, title: &str, artist: &str) -> ServiceItem {
    ServiceItem::new(
        id.to_string(),
        "favorite_track",
        json!({
            "id": id,
            "title": title,
            "duration": 200,
            "artist": { "name": artist },
            "album": { "title": "Album" }
        }),
    )
}

pub async fn vault_for(user_id: &str, services: &[&str]) -> Arc<TokenVault> {
    let vault = Arc::new(TokenVault::new());
    for service in services {
        vault
            .store_tokens(
                UserServiceRef::new(user_id, *service).unwrap(),
                OAuthTokens::new(format!("token-{service}"), None, 3600),
            )
            .await;
    }
    vault
}

pub fn fast_settings() -> SyncSettings {
    SyncSettings::default()
        .with_item_delay(Duration::ZERO)
        .with_manual_workers(2)
        .with_auto_workers(1)
}

pub struct Harness {
    pub engine: SyncEngine,
    pub adder: Arc<RecordingAdder>,
}

pub async fn harness(
    providers: Vec<Arc<FakeProvider>>,
    vault: Arc<TokenVault>,
    adder: RecordingAdder,
    settings: SyncSettings,
) -> Harness {
    let store = SqliteMetadataStore::in_memory().await.unwrap();
    store.initialize().await.unwrap();

    let adder = Arc::new(adder);
    let engine = SyncEngine::builder()
        .oauth(vault)
        .adder(adder.clone())
        .store(Arc::new(store))
        .settings(settings)
        .build()
        .unwrap();

    for provider in providers {
        engine.registry().register(provider).await.unwrap();
    }

    Harness { engine, adder }
}
