//! # Sync Results
//!
//! What a worker produces for each dequeued job. Failures discovered while
//! executing are values inside the result, never hard errors.

use crate::job::SyncJobId;
use crate::request::{ServicePair, SyncMode};
use chrono::{DateTime, Utc};
use core_matching::{SyncType, UniversalItem};
use core_runtime::config::ResultRetention;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Category of an execution-time failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Service resolution, fetch or rate-limit wait failed
    ServiceError,
    /// Token retrieval failed
    AuthError,
    /// A native item could not be converted
    TransformError,
    /// The target rejected an item
    AddError,
    /// Configuration unusable at execution time
    ConfigError,
}

impl SyncErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorKind::ServiceError => "service_error",
            SyncErrorKind::AuthError => "auth_error",
            SyncErrorKind::TransformError => "transform_error",
            SyncErrorKind::AddError => "add_error",
            SyncErrorKind::ConfigError => "config_error",
        }
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One failure captured during execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    #[serde(rename = "type")]
    pub kind: SyncErrorKind,
    pub error: String,
    pub item_id: Option<String>,
    /// Stage label such as `fetch:spotify` or `add:deezer`
    pub context: String,
}

impl SyncFailure {
    pub fn new(kind: SyncErrorKind, error: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            item_id: None,
            context: context.into(),
        }
    }

    pub fn with_item(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }
}

/// Outcome of one service pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePairResult {
    pub source_service: String,
    pub target_service: String,
    pub sync_mode: SyncMode,
    /// `true` iff `errors` is empty
    pub success: bool,
    pub items_synced: Vec<UniversalItem>,
    pub items_failed: Vec<UniversalItem>,
    pub errors: Vec<SyncFailure>,
    pub duration: Duration,
}

impl ServicePairResult {
    pub fn new(pair: &ServicePair) -> Self {
        Self {
            source_service: pair.source_service.clone(),
            target_service: pair.target_service.clone(),
            sync_mode: pair.sync_mode,
            success: true,
            items_synced: Vec::new(),
            items_failed: Vec::new(),
            errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Record a failure that aborts the pair
    pub fn abort(mut self, failure: SyncFailure, duration: Duration) -> Self {
        self.errors.push(failure);
        self.finish(duration)
    }

    pub(crate) fn finish(mut self, duration: Duration) -> Self {
        self.success = self.errors.is_empty();
        self.duration = duration;
        self
    }
}

/// Aggregate outcome of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossServiceSyncResult {
    pub job_id: SyncJobId,
    pub user_id: String,
    pub sync_type: SyncType,
    /// `true` iff `total_failed == 0`; errors that did not fail an item
    /// (auth, service, transform, config) show up in `errors` only
    pub success: bool,
    pub service_pair_results: Vec<ServicePairResult>,
    pub total_synced: u64,
    /// Items the target rejected, summed over all pairs
    pub total_failed: u64,
    pub duration: Duration,
    pub errors: Vec<SyncFailure>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub completed_at: DateTime<Utc>,
}

impl CrossServiceSyncResult {
    /// Aggregate pair results in order
    pub fn from_pairs(
        job_id: SyncJobId,
        user_id: impl Into<String>,
        sync_type: SyncType,
        service_pair_results: Vec<ServicePairResult>,
        duration: Duration,
    ) -> Self {
        let total_synced = service_pair_results
            .iter()
            .map(|p| p.items_synced.len() as u64)
            .sum();
        let errors: Vec<SyncFailure> = service_pair_results
            .iter()
            .flat_map(|p| p.errors.iter().cloned())
            .collect();
        let total_failed = service_pair_results
            .iter()
            .map(|p| p.items_failed.len() as u64)
            .sum();

        Self {
            job_id,
            user_id: user_id.into(),
            sync_type,
            success: total_failed == 0,
            service_pair_results,
            total_synced,
            total_failed,
            duration,
            errors,
            metadata: HashMap::new(),
            completed_at: Utc::now(),
        }
    }

    /// Copy suitable for persistence under `retention`
    pub fn retained(&self, retention: ResultRetention) -> Self {
        let mut stored = self.clone();
        if retention == ResultRetention::CountsOnly {
            for pair in &mut stored.service_pair_results {
                pair.items_synced.clear();
                pair.items_failed.clear();
            }
            stored
                .metadata
                .insert("retention".to_string(), serde_json::json!("counts_only"));
        }
        stored
    }

    /// Count failures of one kind
    pub fn failures_of(&self, kind: SyncErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }
}
