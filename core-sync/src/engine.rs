//! # Sync Engine
//!
//! Owns the two bounded job queues, their worker pools and the scheduler.
//!
//! ## Overview
//!
//! - Manual jobs are admitted with a non-blocking send and fail fast with
//!   `QueueFull` when the queue has no room.
//! - Automatic jobs are registered with the [`Scheduler`], which defers
//!   (never drops) a due job while the automatic queue is full.
//! - Each queue has its own worker pool so a burst on one cannot starve the
//!   other.
//!
//! ## Lifecycle
//!
//! [`SyncEngine::start`] spawns the workers and the scheduler task under a
//! child of the caller's token. [`SyncEngine::stop`] cancels that child and
//! waits for every task, so jobs already being processed finish first.
//! Cancelling the caller's token also unblocks rate-limiter waits and
//! pacing delays inside in-flight jobs.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = SyncEngine::builder()
//!     .registry(registry)
//!     .oauth(oauth)
//!     .adder(adder)
//!     .store(store)
//!     .build()?;
//!
//! let ctx = CancellationToken::new();
//! engine.start(ctx.clone()).await?;
//! engine.queue_manual_sync(request).await?;
//! // ...
//! engine.stop().await?;
//! ```

use crate::job::SyncJobId;
use crate::metrics::{SyncMetrics, SyncTypeMetrics};
use crate::pipeline::JobProcessor;
use crate::provider::ItemAdder;
use crate::registry::ServiceRegistry;
use crate::repository::MetadataStore;
use crate::request::SyncJobRequest;
use crate::result::CrossServiceSyncResult;
use crate::scheduler::Scheduler;
use crate::{Result, SyncError};
use chrono::Utc;
use core_auth::OAuthManager;
use core_matching::SyncType;
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

type JobReceiver = Arc<Mutex<mpsc::Receiver<SyncJobRequest>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueKind {
    Manual,
    Automatic,
}

impl QueueKind {
    fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Manual => "manual",
            QueueKind::Automatic => "automatic",
        }
    }
}

/// Remaining room in both queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub manual_capacity: usize,
    pub manual_available: usize,
    pub auto_capacity: usize,
    pub auto_available: usize,
}

impl QueueStats {
    pub fn manual_pending(&self) -> usize {
        self.manual_capacity - self.manual_available
    }

    pub fn auto_pending(&self) -> usize {
        self.auto_capacity - self.auto_available
    }
}

struct RunningEngine {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

pub struct SyncEngine {
    processor: Arc<JobProcessor>,
    registry: Arc<ServiceRegistry>,
    scheduler: Arc<Scheduler>,
    store: Arc<dyn MetadataStore>,
    metrics: Arc<SyncMetrics>,
    events: EventBus,
    settings: SyncSettings,
    manual_tx: mpsc::Sender<SyncJobRequest>,
    auto_tx: mpsc::Sender<SyncJobRequest>,
    manual_rx: JobReceiver,
    auto_rx: JobReceiver,
    running: Mutex<Option<RunningEngine>>,
}

impl SyncEngine {
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::default()
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Validate a request and enqueue it on the manual queue
    ///
    /// Never blocks. Jobs queued before [`start`](Self::start) are picked up
    /// once workers run.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for a malformed request
    /// - `UnknownService` if a pair names an unregistered service
    /// - `QueueFull` if the manual queue has no capacity
    #[instrument(skip(self, request), fields(user_id = %request.user_id, sync_type = %request.sync_type))]
    pub async fn queue_manual_sync(&self, mut request: SyncJobRequest) -> Result<()> {
        self.validate_for_admission(&request).await?;
        request.is_scheduled = false;

        let user_id = request.user_id.clone();
        let sync_type = request.sync_type;

        match self.manual_tx.try_send(request) {
            Ok(()) => {
                info!("Manual sync queued");
                self.events
                    .emit(CoreEvent::Sync(SyncEvent::Queued {
                        user_id,
                        sync_type: sync_type.to_string(),
                        scheduled: false,
                    }))
                    .ok();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!("Manual queue full, rejecting sync");
                Err(SyncError::QueueFull {
                    queue: QueueKind::Manual.as_str().to_string(),
                })
            }
            Err(TrySendError::Closed(_)) => Err(SyncError::EngineStopped),
        }
    }

    /// Validate a request and register it as a recurring sync
    ///
    /// # Errors
    ///
    /// - `MissingSchedule` if the request has no schedule
    /// - the same validation errors as [`queue_manual_sync`](Self::queue_manual_sync)
    #[instrument(skip(self, request), fields(user_id = %request.user_id, sync_type = %request.sync_type))]
    pub async fn schedule_auto_sync(&self, mut request: SyncJobRequest) -> Result<()> {
        if request.schedule.is_none() {
            return Err(SyncError::MissingSchedule);
        }
        self.validate_for_admission(&request).await?;
        request.is_scheduled = true;

        self.scheduler.schedule(request).await
    }

    /// Disable a recurring sync
    ///
    /// # Errors
    ///
    /// Returns an error if the store update fails
    pub async fn unschedule_auto_sync(&self, user_id: &str, sync_type: SyncType) -> Result<bool> {
        self.scheduler.unschedule(user_id, sync_type).await
    }

    async fn validate_for_admission(&self, request: &SyncJobRequest) -> Result<()> {
        request.validate()?;
        for service in request.services() {
            if !self.registry.contains(service).await {
                return Err(SyncError::UnknownService(service.to_string()));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Spawn the worker pools and the scheduler
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if the engine has been started and not stopped
    pub async fn start(&self, ctx: CancellationToken) -> Result<()> {
        let mut running = self.running.lock().await;

        if let Some(current) = running.as_ref() {
            if !current.shutdown.is_cancelled() {
                return Err(SyncError::AlreadyRunning);
            }
        }
        // Reap tasks that exited because an earlier caller token was cancelled
        if let Some(previous) = running.take() {
            join_all(previous.handles).await;
        }

        match self.scheduler.load_from_store(Utc::now()).await {
            Ok(count) => debug!(count, "Restored schedules"),
            Err(e) => warn!(error = %e, "Failed to restore schedules"),
        }

        let shutdown = ctx.child_token();
        let mut handles = Vec::new();

        for (kind, workers, receiver) in [
            (QueueKind::Manual, self.settings.manual_workers, &self.manual_rx),
            (QueueKind::Automatic, self.settings.auto_workers, &self.auto_rx),
        ] {
            for worker_id in 0..workers.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    kind,
                    worker_id,
                    Arc::clone(&self.processor),
                    Arc::clone(receiver),
                    shutdown.clone(),
                    ctx.clone(),
                )));
            }
        }

        handles.push(tokio::spawn(
            Arc::clone(&self.scheduler).run(shutdown.clone()),
        ));

        info!(
            manual_workers = self.settings.manual_workers.max(1),
            auto_workers = self.settings.auto_workers.max(1),
            "Sync engine started"
        );

        *running = Some(RunningEngine { shutdown, handles });
        Ok(())
    }

    /// Stop taking jobs and wait for workers and the scheduler to exit
    ///
    /// Jobs already being processed run to completion. Calling this on an
    /// engine that is not running is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            debug!("Stop requested on idle engine");
            return Ok(());
        };

        running.shutdown.cancel();
        join_all(running.handles).await;

        info!("Sync engine stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.shutdown.is_cancelled())
    }

    // ========================================================================
    // Execution and queries
    // ========================================================================

    /// Run a job inline on the caller's task, bypassing the queues
    pub async fn process_sync_job(
        &self,
        request: SyncJobRequest,
        ctx: &CancellationToken,
    ) -> CrossServiceSyncResult {
        self.processor.process_sync_job(request, ctx).await
    }

    /// # Errors
    ///
    /// Returns `ResultNotFound` if no result is stored for the job
    pub async fn get_sync_result(&self, job_id: &SyncJobId) -> Result<CrossServiceSyncResult> {
        self.store
            .get_result(job_id)
            .await?
            .ok_or_else(|| SyncError::ResultNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// A user's results, most recent first
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails
    pub async fn get_user_sync_results(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
        success_only: bool,
    ) -> Result<Vec<CrossServiceSyncResult>> {
        self.store
            .get_user_results(user_id, limit, offset, success_only)
            .await
    }

    pub async fn metrics(&self) -> HashMap<SyncType, SyncTypeMetrics> {
        self.metrics.snapshot().await
    }

    pub fn queue_stats(&self) -> QueueStats {
        QueueStats {
            manual_capacity: self.manual_tx.max_capacity(),
            manual_available: self.manual_tx.capacity(),
            auto_capacity: self.auto_tx.max_capacity(),
            auto_available: self.auto_tx.capacity(),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn processor(&self) -> &Arc<JobProcessor> {
        &self.processor
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }
}

async fn worker_loop(
    kind: QueueKind,
    worker_id: usize,
    processor: Arc<JobProcessor>,
    receiver: JobReceiver,
    shutdown: CancellationToken,
    ctx: CancellationToken,
) {
    debug!(queue = kind.as_str(), worker_id, "Worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            request = async { receiver.lock().await.recv().await } => request,
        };

        let Some(request) = next else {
            break;
        };
        processor.process_sync_job(request, &ctx).await;
    }

    debug!(queue = kind.as_str(), worker_id, "Worker stopped");
}

async fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Engine task ended abnormally");
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Default)]
pub struct SyncEngineBuilder {
    registry: Option<Arc<ServiceRegistry>>,
    oauth: Option<Arc<dyn OAuthManager>>,
    adder: Option<Arc<dyn ItemAdder>>,
    store: Option<Arc<dyn MetadataStore>>,
    metrics: Option<Arc<SyncMetrics>>,
    events: Option<EventBus>,
    settings: SyncSettings,
}

impl SyncEngineBuilder {
    pub fn registry(mut self, registry: Arc<ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn oauth(mut self, oauth: Arc<dyn OAuthManager>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    pub fn adder(mut self, adder: Arc<dyn ItemAdder>) -> Self {
        self.adder = Some(adder);
        self
    }

    pub fn store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// # Errors
    ///
    /// - `CapabilityMissing` if the OAuth manager, item adder or store is unset
    /// - `Config` if the settings are invalid
    pub fn build(self) -> Result<SyncEngine> {
        self.settings.validate()?;

        let oauth = self
            .oauth
            .ok_or_else(|| SyncError::CapabilityMissing("oauth manager".to_string()))?;
        let adder = self
            .adder
            .ok_or_else(|| SyncError::CapabilityMissing("item adder".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| SyncError::CapabilityMissing("metadata store".to_string()))?;
        let registry = self.registry.unwrap_or_default();
        let metrics = self.metrics.unwrap_or_default();
        let events = self.events.unwrap_or_default();
        let settings = self.settings;

        let (manual_tx, manual_rx) = mpsc::channel(settings.manual_queue_capacity);
        let (auto_tx, auto_rx) = mpsc::channel(settings.auto_queue_capacity);

        let scheduler = Arc::new(Scheduler::new(
            auto_tx.clone(),
            Arc::clone(&store),
            events.clone(),
            settings.scheduler_tick,
        ));

        let processor = Arc::new(JobProcessor::new(
            Arc::clone(&registry),
            oauth,
            adder,
            Arc::clone(&store),
            Arc::clone(&metrics),
            events.clone(),
            settings.clone(),
        ));

        Ok(SyncEngine {
            processor,
            registry,
            scheduler,
            store,
            metrics,
            events,
            settings,
            manual_tx,
            auto_tx,
            manual_rx: Arc::new(Mutex::new(manual_rx)),
            auto_rx: Arc::new(Mutex::new(auto_rx)),
            running: Mutex::new(None),
        })
    }
}
