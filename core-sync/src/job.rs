//! # Sync Job Records
//!
//! Metadata kept for every executed job. Records never carry item content.
//!
//! ## State Machine
//!
//! ```text
//! Running → Completed
//!     ↓
//!     └──→ Failed
//! ```
//!
//! A record is written twice: once when a worker picks the job up and once
//! when it finishes.

use crate::request::{Priority, SyncJobRequest};
use crate::result::CrossServiceSyncResult;
use crate::{Result, SyncError};
use core_matching::SyncType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncJobId(Uuid);

impl SyncJobId {
    /// Create a new random sync job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a sync job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::InvalidJobId(e.to_string()))?,
        ))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SyncJobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    /// Finished with zero failures
    Completed,
    /// Finished with at least one failure
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Record
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJobRecord {
    pub id: SyncJobId,
    pub user_id: String,
    pub sync_type: SyncType,
    pub status: JobStatus,
    pub is_scheduled: bool,
    pub priority: Priority,
    pub pair_count: u32,
    pub items_synced: u64,
    pub items_failed: u64,
    pub error_count: u32,
    /// Unix milliseconds
    pub created_at: i64,
    /// Unix milliseconds
    pub completed_at: Option<i64>,
}

impl SyncJobRecord {
    /// Record for a job a worker just picked up
    pub fn start(id: SyncJobId, request: &SyncJobRequest) -> Self {
        Self {
            id,
            user_id: request.user_id.clone(),
            sync_type: request.sync_type,
            status: JobStatus::Running,
            is_scheduled: request.is_scheduled,
            priority: request.priority,
            pair_count: request.service_pairs.len() as u32,
            items_synced: 0,
            items_failed: 0,
            error_count: 0,
            created_at: now_millis(),
            completed_at: None,
        }
    }

    /// Close the record with the job's totals
    ///
    /// Moves to `Completed` when the result succeeded, `Failed` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is already terminal
    pub fn finish(self, result: &CrossServiceSyncResult) -> Result<Self> {
        let to = if result.success {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        self.transition(to, result)
    }

    /// Duration between creation and completion
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at.map(|end| end - self.created_at)
    }

    fn transition(mut self, to: JobStatus, result: &CrossServiceSyncResult) -> Result<Self> {
        if self.status != JobStatus::Running || !to.is_terminal() {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        self.status = to;
        self.items_synced = result.total_synced;
        self.items_failed = result.total_failed;
        self.error_count = result.errors.len() as u32;
        self.completed_at = Some(now_millis());
        Ok(self)
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ServicePair, SyncMode};
    use crate::result::{ServicePairResult, SyncErrorKind, SyncFailure};
    use core_matching::UniversalItem;
    use std::time::Duration;

    fn request() -> SyncJobRequest {
        SyncJobRequest::new("user-1", SyncType::Favorites)
            .with_pair(ServicePair::new("spotify", "deezer", SyncMode::SyncFrom))
    }

    fn result(id: SyncJobId, failures: usize) -> CrossServiceSyncResult {
        let mut pair = ServicePairResult::new(&request().service_pairs[0]);
        for i in 0..failures {
            pair.items_failed.push(UniversalItem::new(format!("Song {i}"), "Artist"));
            pair.errors.push(
                SyncFailure::new(SyncErrorKind::AddError, "rejected", "add:deezer")
                    .with_item(format!("sp-{i}")),
            );
        }
        CrossServiceSyncResult::from_pairs(
            id,
            "user-1",
            SyncType::Favorites,
            vec![pair.finish(Duration::ZERO)],
            Duration::ZERO,
        )
    }

    #[test]
    fn test_sync_job_id_new() {
        assert_ne!(SyncJobId::new(), SyncJobId::new());
    }

    #[test]
    fn test_sync_job_id_from_string() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id = SyncJobId::from_string(uuid_str).unwrap();
        assert_eq!(id.as_str(), uuid_str);
        assert!(SyncJobId::from_string("nope").is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [JobStatus::Running, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("pending".parse::<JobStatus>().is_err());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_record_completes() {
        let id = SyncJobId::new();
        let record = SyncJobRecord::start(id, &request());
        assert_eq!(record.status, JobStatus::Running);
        assert_eq!(record.pair_count, 1);

        let record = record.finish(&result(id, 0)).unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert!(record.duration_ms().is_some());
    }

    #[test]
    fn test_record_fails_with_errors() {
        let id = SyncJobId::new();
        let record = SyncJobRecord::start(id, &request())
            .finish(&result(id, 2))
            .unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.items_failed, 2);
        assert_eq!(record.error_count, 2);
    }

    #[test]
    fn test_terminal_record_cannot_finish_again() {
        let id = SyncJobId::new();
        let record = SyncJobRecord::start(id, &request())
            .finish(&result(id, 0))
            .unwrap();
        assert!(matches!(
            record.finish(&result(id, 0)),
            Err(SyncError::InvalidStateTransition { .. })
        ));
    }
}
