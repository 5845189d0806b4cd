//! # Recurring Sync Scheduler
//!
//! Holds enabled automatic requests keyed by `(user_id, sync_type)` and feeds
//! due ones into the automatic queue.
//!
//! ## Deferral
//!
//! Each tick tries a non-blocking send per due schedule. `next_run` only
//! advances when the send succeeds, so a full queue defers the job to the
//! next tick instead of dropping or duplicating it.

use crate::repository::MetadataStore;
use crate::request::SyncJobRequest;
use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use core_matching::SyncType;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

type ScheduleKey = (String, SyncType);

pub struct Scheduler {
    schedules: Mutex<HashMap<ScheduleKey, SyncJobRequest>>,
    queue: mpsc::Sender<SyncJobRequest>,
    store: Arc<dyn MetadataStore>,
    events: EventBus,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        queue: mpsc::Sender<SyncJobRequest>,
        store: Arc<dyn MetadataStore>,
        events: EventBus,
        tick_interval: Duration,
    ) -> Self {
        Self {
            schedules: Mutex::new(HashMap::new()),
            queue,
            store,
            events,
            tick_interval,
        }
    }

    /// Register or replace the schedule for `(user_id, sync_type)`
    ///
    /// An unset `next_run` defaults to `now + frequency`.
    ///
    /// # Errors
    ///
    /// - `MissingSchedule` if the request has no schedule
    /// - `InvalidSchedule` if the schedule is invalid
    /// - `Database` if the store rejects the schedule
    #[instrument(skip(self, request), fields(user_id = %request.user_id, sync_type = %request.sync_type))]
    pub async fn schedule(&self, mut request: SyncJobRequest) -> Result<()> {
        let schedule = request.schedule.as_mut().ok_or(SyncError::MissingSchedule)?;
        schedule.validate()?;

        let next_run = match schedule.next_run {
            Some(next_run) => next_run,
            None => {
                let next_run = schedule.next_after(Utc::now());
                schedule.next_run = Some(next_run);
                next_run
            }
        };
        request.is_scheduled = true;

        self.store.upsert_schedule(&request).await?;

        let key = (request.user_id.clone(), request.sync_type);
        self.schedules.lock().await.insert(key, request.clone());

        info!(next_run = %next_run, "Schedule registered");
        self.events
            .emit(CoreEvent::Sync(SyncEvent::ScheduleRegistered {
                user_id: request.user_id,
                sync_type: request.sync_type.to_string(),
                next_run: next_run.timestamp_millis(),
            }))
            .ok();

        Ok(())
    }

    /// Disable the schedule for `(user_id, sync_type)`
    ///
    /// Returns whether a schedule existed in memory or in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store update fails
    pub async fn unschedule(&self, user_id: &str, sync_type: SyncType) -> Result<bool> {
        let removed = self
            .schedules
            .lock()
            .await
            .remove(&(user_id.to_string(), sync_type))
            .is_some();
        let stored = self.store.disable_schedule(user_id, sync_type).await?;

        if removed || stored {
            info!(user_id, sync_type = %sync_type, "Schedule disabled");
        }
        Ok(removed || stored)
    }

    /// Snapshot of all schedules held in memory
    pub async fn list_schedules(&self) -> Vec<SyncJobRequest> {
        self.schedules.lock().await.values().cloned().collect()
    }

    /// Reload enabled schedules that are due at or after `now`
    ///
    /// Returns the number loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails
    pub async fn load_from_store(&self, now: DateTime<Utc>) -> Result<usize> {
        let requests = self.store.load_schedules(now).await?;
        let count = requests.len();

        let mut schedules = self.schedules.lock().await;
        for request in requests {
            schedules.insert((request.user_id.clone(), request.sync_type), request);
        }

        info!(count, "Loaded schedules from store");
        Ok(count)
    }

    /// Enqueue every enabled schedule due at `now`
    ///
    /// Returns how many jobs were enqueued.
    ///
    /// # Errors
    ///
    /// Returns `EngineStopped` if the automatic queue is closed
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut enqueued = 0;
        let mut advanced = Vec::new();

        {
            let mut schedules = self.schedules.lock().await;
            for request in schedules.values_mut() {
                let Some(schedule) = request.schedule.as_ref() else {
                    continue;
                };
                if !schedule.enabled || schedule.next_run.is_some_and(|next| next > now) {
                    continue;
                }

                let mut job = request.clone();
                job.requested_at = now;
                job.is_scheduled = true;

                match self.queue.try_send(job) {
                    Ok(()) => {
                        let next_run = schedule.next_after(now);
                        if let Some(schedule) = request.schedule.as_mut() {
                            schedule.next_run = Some(next_run);
                        }
                        enqueued += 1;
                        advanced.push(request.clone());

                        self.events
                            .emit(CoreEvent::Sync(SyncEvent::Queued {
                                user_id: request.user_id.clone(),
                                sync_type: request.sync_type.to_string(),
                                scheduled: true,
                            }))
                            .ok();
                    }
                    Err(TrySendError::Full(_)) => {
                        debug!(
                            user_id = %request.user_id,
                            sync_type = %request.sync_type,
                            "Automatic queue full, deferring schedule"
                        );
                        self.events
                            .emit(CoreEvent::Sync(SyncEvent::ScheduleDeferred {
                                user_id: request.user_id.clone(),
                                sync_type: request.sync_type.to_string(),
                            }))
                            .ok();
                    }
                    Err(TrySendError::Closed(_)) => return Err(SyncError::EngineStopped),
                }
            }
        }

        for request in &advanced {
            if let Err(e) = self.store.upsert_schedule(request).await {
                warn!(
                    user_id = %request.user_id,
                    sync_type = %request.sync_type,
                    error = %e,
                    "Failed to persist advanced schedule"
                );
            }
        }

        if enqueued > 0 {
            debug!(enqueued, "Scheduler tick enqueued jobs");
        }
        Ok(enqueued)
    }

    /// Tick on the configured interval until `token` is cancelled
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(tick_ms = self.tick_interval.as_millis() as u64, "Scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        warn!(error = %e, "Scheduler tick failed, stopping");
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SqliteMetadataStore;
    use crate::request::{ScheduleSpec, ServicePair, SyncMode};
    use chrono::Duration as ChronoDuration;

    async fn scheduler(capacity: usize) -> (Scheduler, mpsc::Receiver<SyncJobRequest>, EventBus) {
        let store = SqliteMetadataStore::in_memory().await.unwrap();
        store.initialize().await.unwrap();
        let (tx, rx) = mpsc::channel(capacity);
        let events = EventBus::new(64);
        let scheduler = Scheduler::new(
            tx,
            Arc::new(store),
            events.clone(),
            Duration::from_secs(60),
        );
        (scheduler, rx, events)
    }

    fn request(user: &str, next_run: Option<DateTime<Utc>>) -> SyncJobRequest {
        let mut spec = ScheduleSpec::every(Duration::from_secs(600));
        spec.next_run = next_run;
        SyncJobRequest::new(user, SyncType::Favorites)
            .with_pair(ServicePair::new("spotify", "deezer", SyncMode::SyncFrom))
            .with_schedule(spec)
    }

    #[tokio::test]
    async fn test_schedule_requires_spec() {
        let (scheduler, _rx, _) = scheduler(1).await;
        let req = SyncJobRequest::new("u", SyncType::Favorites)
            .with_pair(ServicePair::new("a", "b", SyncMode::SyncFrom));
        assert_eq!(scheduler.schedule(req).await, Err(SyncError::MissingSchedule));
    }

    #[tokio::test]
    async fn test_schedule_defaults_next_run() {
        let (scheduler, _rx, _) = scheduler(1).await;
        let before = Utc::now();
        scheduler.schedule(request("u1", None)).await.unwrap();

        let schedules = scheduler.list_schedules().await;
        assert_eq!(schedules.len(), 1);
        assert!(schedules[0].is_scheduled);
        let next_run = schedules[0].schedule.as_ref().unwrap().next_run.unwrap();
        assert!(next_run >= before + ChronoDuration::seconds(600));
    }

    #[tokio::test]
    async fn test_reschedule_replaces_same_key() {
        let (scheduler, _rx, _) = scheduler(1).await;
        scheduler.schedule(request("u1", None)).await.unwrap();
        scheduler.schedule(request("u1", None)).await.unwrap();
        scheduler.schedule(request("u2", None)).await.unwrap();
        assert_eq!(scheduler.list_schedules().await.len(), 2);
    }

    #[tokio::test]
    async fn test_tick_enqueues_due_and_advances() {
        let (scheduler, mut rx, _) = scheduler(4).await;
        let now = Utc::now();
        scheduler
            .schedule(request("due", Some(now - ChronoDuration::seconds(1))))
            .await
            .unwrap();
        scheduler
            .schedule(request("later", Some(now + ChronoDuration::hours(1))))
            .await
            .unwrap();

        assert_eq!(scheduler.tick(now).await.unwrap(), 1);

        let job = rx.try_recv().unwrap();
        assert_eq!(job.user_id, "due");
        assert!(job.is_scheduled);
        assert!(rx.try_recv().is_err());

        // Advanced by one frequency, so not due again right away
        assert_eq!(scheduler.tick(now).await.unwrap(), 0);
        assert_eq!(
            scheduler
                .tick(now + ChronoDuration::seconds(600))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_tick_defers_when_queue_full() {
        let (scheduler, mut rx, events) = scheduler(1).await;
        let mut sub = events.subscribe();
        let now = Utc::now();
        let due = Some(now - ChronoDuration::seconds(1));

        scheduler.schedule(request("a", due)).await.unwrap();
        scheduler.schedule(request("b", due)).await.unwrap();

        // Only one slot: one enqueued, one deferred
        assert_eq!(scheduler.tick(now).await.unwrap(), 1);

        let mut deferred = 0;
        while let Ok(event) = sub.try_recv() {
            if matches!(event, CoreEvent::Sync(SyncEvent::ScheduleDeferred { .. })) {
                deferred += 1;
            }
        }
        assert_eq!(deferred, 1);

        // The deferred one still has its old next_run and goes out next tick
        let first = rx.try_recv().unwrap();
        assert_eq!(scheduler.tick(now).await.unwrap(), 1);
        let second = rx.try_recv().unwrap();
        assert_ne!(first.user_id, second.user_id);

        // Neither is duplicated
        assert_eq!(scheduler.tick(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_schedule_never_fires() {
        let (scheduler, _rx, _) = scheduler(4).await;
        let mut req = request("u1", Some(Utc::now() - ChronoDuration::seconds(5)));
        if let Some(spec) = req.schedule.as_mut() {
            spec.enabled = false;
        }
        scheduler.schedule(req).await.unwrap();
        assert_eq!(scheduler.tick(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unschedule() {
        let (scheduler, _rx, _) = scheduler(4).await;
        scheduler.schedule(request("u1", None)).await.unwrap();

        assert!(scheduler.unschedule("u1", SyncType::Favorites).await.unwrap());
        assert!(scheduler.list_schedules().await.is_empty());
        assert!(!scheduler.unschedule("u1", SyncType::Playlists).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_queue_reports_stopped() {
        let (scheduler, rx, _) = scheduler(1).await;
        drop(rx);
        scheduler
            .schedule(request("u1", Some(Utc::now() - ChronoDuration::seconds(1))))
            .await
            .unwrap();
        assert_eq!(
            scheduler.tick(Utc::now()).await,
            Err(SyncError::EngineStopped)
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (scheduler, _rx, _) = scheduler(1).await;
        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::new(scheduler).run(token.clone()));
        token.cancel();
        handle.await.unwrap();
    }
}
