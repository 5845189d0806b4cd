//! In-memory job counters keyed by sync type.

use crate::result::CrossServiceSyncResult;
use chrono::{DateTime, Utc};
use core_matching::SyncType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Counters for one sync type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncTypeMetrics {
    pub successful_jobs: u64,
    pub failed_jobs: u64,
    pub items_synced: u64,
    pub items_failed: u64,
    pub total_duration: Duration,
    pub last_run: Option<DateTime<Utc>>,
}

impl SyncTypeMetrics {
    pub fn total_jobs(&self) -> u64 {
        self.successful_jobs + self.failed_jobs
    }

    /// Mean job duration, `None` before the first job
    pub fn average_duration(&self) -> Option<Duration> {
        let jobs = self.total_jobs();
        if jobs == 0 {
            return None;
        }
        u32::try_from(jobs)
            .ok()
            .map(|jobs| self.total_duration / jobs)
    }
}

/// Shared job metrics, updated once per finished job
#[derive(Debug, Default)]
pub struct SyncMetrics {
    by_type: Mutex<HashMap<SyncType, SyncTypeMetrics>>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, result: &CrossServiceSyncResult) {
        let mut by_type = self.by_type.lock().await;
        let entry = by_type.entry(result.sync_type).or_default();

        if result.success {
            entry.successful_jobs += 1;
        } else {
            entry.failed_jobs += 1;
        }
        entry.items_synced += result.total_synced;
        entry.items_failed += result.total_failed;
        entry.total_duration += result.duration;
        entry.last_run = Some(result.completed_at);
    }

    pub async fn snapshot(&self) -> HashMap<SyncType, SyncTypeMetrics> {
        self.by_type.lock().await.clone()
    }

    pub async fn get(&self, sync_type: SyncType) -> SyncTypeMetrics {
        self.by_type
            .lock()
            .await
            .get(&sync_type)
            .cloned()
            .unwrap_or_default()
    }
}
