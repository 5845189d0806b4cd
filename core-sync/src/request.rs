//! # Sync Requests
//!
//! Shape of a sync job as submitted by a caller, plus the structural checks
//! run at admission time.
//!
//! Registry membership of the services is checked by the engine, since only
//! the engine knows which services are registered.

use crate::{Result, SyncError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use core_matching::SyncType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Shortest allowed interval between recurring runs
pub const MIN_SCHEDULE_FREQUENCY: Duration = Duration::from_secs(60);

// ============================================================================
// Enumerations
// ============================================================================

/// Direction of a sync between the two services of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Source to target
    SyncFrom,
    /// Target to source
    SyncTo,
    /// Both directions, each attempted independently
    Bidirectional,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::SyncFrom => "sync-from",
            SyncMode::SyncTo => "sync-to",
            SyncMode::Bidirectional => "bidirectional",
        }
    }
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sync-from" => Ok(SyncMode::SyncFrom),
            "sync-to" => Ok(SyncMode::SyncTo),
            "bidirectional" => Ok(SyncMode::Bidirectional),
            _ => Err(SyncError::InvalidSyncMode(s.to_string())),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the target treats an item it already has. Enforced by the item adder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    Skip,
    Overwrite,
    Merge,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Skip => "skip",
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::Merge => "merge",
        }
    }
}

/// Job priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(SyncError::InvalidRequest(format!("unknown priority '{s}'"))),
        }
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// A source/target combination with a direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePair {
    pub source_service: String,
    pub target_service: String,
    pub sync_mode: SyncMode,
}

impl ServicePair {
    pub fn new(
        source_service: impl Into<String>,
        target_service: impl Into<String>,
        sync_mode: SyncMode,
    ) -> Self {
        Self {
            source_service: source_service.into(),
            target_service: target_service.into(),
            sync_mode,
        }
    }

    /// Check that both services are named and distinct
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if either name is empty or both are the same
    pub fn validate(&self) -> Result<()> {
        if self.source_service.trim().is_empty() || self.target_service.trim().is_empty() {
            return Err(SyncError::InvalidRequest(
                "service pair has an empty service name".to_string(),
            ));
        }
        if self.source_service == self.target_service {
            return Err(SyncError::InvalidRequest(format!(
                "service pair syncs {} with itself",
                self.source_service
            )));
        }
        Ok(())
    }
}

/// Per-job knobs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Confidence the adder requires when searching the target, engine
    /// default when unset
    pub match_threshold: Option<f64>,
    /// Match and transform only, never write to the target
    pub dry_run: bool,
    pub conflict_policy: ConflictPolicy,
    /// Only fetch source items changed after this instant
    pub since: Option<DateTime<Utc>>,
}

impl SyncOptions {
    pub fn with_match_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = Some(threshold);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Threshold to use, falling back to `default`
    pub fn effective_threshold(&self, default: f64) -> f64 {
        self.match_threshold.unwrap_or(default)
    }
}

/// Recurrence definition for automatic syncs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub enabled: bool,
    pub frequency: Duration,
    /// Next due time, `now + frequency` when unset at registration
    pub next_run: Option<DateTime<Utc>>,
    /// IANA zone name, informational only
    pub timezone: String,
}

impl ScheduleSpec {
    pub fn every(frequency: Duration) -> Self {
        Self {
            enabled: true,
            frequency,
            next_run: None,
            timezone: "UTC".to_string(),
        }
    }

    pub fn starting_at(mut self, next_run: DateTime<Utc>) -> Self {
        self.next_run = Some(next_run);
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// # Errors
    ///
    /// Returns `InvalidSchedule` if the frequency is under one minute
    pub fn validate(&self) -> Result<()> {
        if self.frequency < MIN_SCHEDULE_FREQUENCY {
            return Err(SyncError::InvalidSchedule(format!(
                "frequency must be at least {}s, got {}s",
                MIN_SCHEDULE_FREQUENCY.as_secs(),
                self.frequency.as_secs()
            )));
        }
        Ok(())
    }

    /// `from + frequency`
    pub fn next_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        ChronoDuration::from_std(self.frequency)
            .ok()
            .and_then(|step| from.checked_add_signed(step))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// A request to sync one user's content across one or more service pairs.
///
/// # Examples
///
/// ```
/// use core_matching::SyncType;
/// use core_sync::{ServicePair, SyncJobRequest, SyncMode};
///
/// let request = SyncJobRequest::new("user-1", SyncType::Favorites)
///     .with_pair(ServicePair::new("spotify", "deezer", SyncMode::SyncFrom));
///
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJobRequest {
    pub user_id: String,
    pub service_pairs: Vec<ServicePair>,
    pub sync_type: SyncType,
    pub options: SyncOptions,
    pub requested_at: DateTime<Utc>,
    pub is_scheduled: bool,
    pub schedule: Option<ScheduleSpec>,
    pub priority: Priority,
}

impl SyncJobRequest {
    pub fn new(user_id: impl Into<String>, sync_type: SyncType) -> Self {
        Self {
            user_id: user_id.into(),
            service_pairs: Vec::new(),
            sync_type,
            options: SyncOptions::default(),
            requested_at: Utc::now(),
            is_scheduled: false,
            schedule: None,
            priority: Priority::default(),
        }
    }

    pub fn with_pair(mut self, pair: ServicePair) -> Self {
        self.service_pairs.push(pair);
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_schedule(mut self, schedule: ScheduleSpec) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Structural validation shared by manual and scheduled admission
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an empty user id, no service pairs, an invalid
    ///   pair or an out-of-range match threshold
    /// - `InvalidSchedule` if a schedule is present but invalid
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(SyncError::InvalidRequest("user id is empty".to_string()));
        }

        if self.service_pairs.is_empty() {
            return Err(SyncError::InvalidRequest(
                "at least one service pair is required".to_string(),
            ));
        }

        for pair in &self.service_pairs {
            pair.validate()?;
        }

        if let Some(threshold) = self.options.match_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(SyncError::InvalidRequest(format!(
                    "match threshold {threshold} is outside [0, 1]"
                )));
            }
        }

        if let Some(schedule) = &self.schedule {
            schedule.validate()?;
        }

        Ok(())
    }

    /// Every service name referenced by the request, in pair order
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.service_pairs
            .iter()
            .flat_map(|p| [p.source_service.as_str(), p.target_service.as_str()])
    }
}
