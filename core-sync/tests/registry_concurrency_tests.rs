//! Concurrent access to the service registry and the manual queue

mod common;

use common::*;
use core_matching::SyncType;
use core_sync::{ServicePair, ServiceRegistry, SyncError, SyncJobRequest, SyncMode};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_keeps_every_service() {
    const N: usize = 32;
    let registry = Arc::new(ServiceRegistry::new());

    let tasks: Vec<_> = (0..N)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .register(Arc::new(FakeProvider::new(&format!("service-{i}"))))
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut services = registry.list_services().await;
    services.sort();
    services.dedup();
    assert_eq!(services.len(), N);
    assert_eq!(registry.len().await, N);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_registration_admits_one() {
    let registry = Arc::new(ServiceRegistry::new());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .register(Arc::new(FakeProvider::new("spotify")))
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => accepted += 1,
            Err(SyncError::ServiceAlreadyRegistered(name)) => assert_eq!(name, "spotify"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn test_category_lookup_and_unregister() {
    let registry = ServiceRegistry::new();
    registry
        .register(Arc::new(FakeProvider::new("spotify")))
        .await
        .unwrap();
    registry
        .register(Arc::new(FakeProvider::new("podcasts").with_category("podcast")))
        .await
        .unwrap();

    assert_eq!(registry.get_services_by_category("music").await, vec!["spotify"]);
    assert!(registry.is_service_available("spotify").await);
    assert!(registry.unregister("spotify").await);
    assert!(!registry.is_service_available("spotify").await);
    assert!(matches!(
        registry.get_service("spotify").await,
        Err(SyncError::ServiceNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_admission_never_exceeds_capacity() {
    const CAPACITY: usize = 4;
    let h = Arc::new(
        harness(
            vec![
                Arc::new(FakeProvider::new("spotify")),
                Arc::new(FakeProvider::new("deezer")),
            ],
            vault_for("user-1", &["spotify", "deezer"]).await,
            RecordingAdder::new(),
            fast_settings().with_manual_queue_capacity(CAPACITY),
        )
        .await,
    );

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let h = Arc::clone(&h);
            tokio::spawn(async move {
                let request = SyncJobRequest::new("user-1", SyncType::Favorites).with_pair(
                    ServicePair::new("spotify", "deezer", SyncMode::SyncFrom),
                );
                h.engine.queue_manual_sync(request).await
            })
        })
        .collect();

    let mut admitted = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => admitted += 1,
            Err(SyncError::QueueFull { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(admitted, CAPACITY);
    assert_eq!(rejected, 16 - CAPACITY);
    assert_eq!(h.engine.queue_stats().manual_pending(), CAPACITY);
}
