//! # Metadata Store
//!
//! Persistence for job records, job results and recurring schedules.
//!
//! ## Overview
//!
//! The engine only talks to the [`MetadataStore`] trait. [`SqliteMetadataStore`]
//! keeps three tables:
//! - `sync_jobs`: status, counts and timestamps, never item content
//! - `sync_results`: the serialized result blob keyed by job id
//! - `sync_schedules`: one row per `(user_id, sync_type)`

use crate::job::{JobStatus, SyncJobId, SyncJobRecord};
use crate::request::{Priority, SyncJobRequest};
use crate::result::CrossServiceSyncResult;
use crate::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_matching::SyncType;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

// ============================================================================
// Store Trait
// ============================================================================

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new job record
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn create_job(&self, job: &SyncJobRecord) -> Result<()>;

    /// Update an existing job record
    ///
    /// # Errors
    ///
    /// Returns `JobNotFound` if the record does not exist
    async fn update_job(&self, job: &SyncJobRecord) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn find_job(&self, id: &SyncJobId) -> Result<Option<SyncJobRecord>>;

    /// Persist a job result, replacing any previous result for the job
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database operation fails
    async fn store_result(&self, result: &CrossServiceSyncResult) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn get_result(&self, id: &SyncJobId) -> Result<Option<CrossServiceSyncResult>>;

    /// A user's results, most recent first
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn get_user_results(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
        success_only: bool,
    ) -> Result<Vec<CrossServiceSyncResult>>;

    /// Insert or replace the schedule keyed by `(user_id, sync_type)`
    ///
    /// # Errors
    ///
    /// Returns `MissingSchedule` if the request has no schedule
    async fn upsert_schedule(&self, request: &SyncJobRequest) -> Result<()>;

    /// Disable a schedule, returning whether one existed
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn disable_schedule(&self, user_id: &str, sync_type: SyncType) -> Result<bool>;

    /// Enabled schedules due at or after `not_before`
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn load_schedules(&self, not_before: DateTime<Utc>) -> Result<Vec<SyncJobRequest>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `database_url`, creating the file if needed
    ///
    /// In-memory databases get a single connection so every query sees the
    /// same database.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection fails
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| SyncError::Database(e.to_string()))?
            .create_if_missing(true);

        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        info!(database_url, max_connections, "Connected metadata store");
        Ok(Self::new(pool))
    }

    /// Connect to a fresh in-memory database
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Create tables and indexes if they do not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn initialize(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS sync_jobs (
                id TEXT PRIMARY KEY NOT NULL,
                user_id TEXT NOT NULL,
                sync_type TEXT NOT NULL,
                status TEXT NOT NULL,
                is_scheduled INTEGER NOT NULL DEFAULT 0,
                priority TEXT NOT NULL,
                pair_count INTEGER NOT NULL DEFAULT 0,
                items_synced INTEGER NOT NULL DEFAULT 0,
                items_failed INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                completed_at INTEGER,
                CONSTRAINT sync_jobs_status_check CHECK (
                    status IN ('running', 'completed', 'failed')
                )
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sync_results (
                job_id TEXT PRIMARY KEY NOT NULL,
                user_id TEXT NOT NULL,
                success INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sync_schedules (
                user_id TEXT NOT NULL,
                sync_type TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                next_run INTEGER NOT NULL,
                request TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, sync_type)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_sync_jobs_user ON sync_jobs(user_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_sync_results_user ON sync_results(user_id, created_at)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| SyncError::Database(e.to_string()))?;
        }

        debug!("Metadata store schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Database row representation of a job record
#[derive(Debug, FromRow)]
struct SyncJobRow {
    id: String,
    user_id: String,
    sync_type: String,
    status: String,
    is_scheduled: bool,
    priority: String,
    pair_count: i64,
    items_synced: i64,
    items_failed: i64,
    error_count: i64,
    created_at: i64,
    completed_at: Option<i64>,
}

impl TryFrom<SyncJobRow> for SyncJobRecord {
    type Error = SyncError;

    fn try_from(row: SyncJobRow) -> Result<Self> {
        let sync_type = SyncType::from_str(&row.sync_type)
            .map_err(|e| SyncError::Database(e.to_string()))?;
        let status: JobStatus = row.status.parse()?;
        let priority: Priority = row.priority.parse()?;

        Ok(SyncJobRecord {
            id: SyncJobId::from_string(&row.id)?,
            user_id: row.user_id,
            sync_type,
            status,
            is_scheduled: row.is_scheduled,
            priority,
            pair_count: row.pair_count as u32,
            items_synced: row.items_synced as u64,
            items_failed: row.items_failed as u64,
            error_count: row.error_count as u32,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn create_job(&self, job: &SyncJobRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_jobs (
                id, user_id, sync_type, status, is_scheduled, priority,
                pair_count, items_synced, items_failed, error_count,
                created_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.as_str())
        .bind(&job.user_id)
        .bind(job.sync_type.as_str())
        .bind(job.status.as_str())
        .bind(job.is_scheduled)
        .bind(job.priority.as_str())
        .bind(job.pair_count as i64)
        .bind(job.items_synced as i64)
        .bind(job.items_failed as i64)
        .bind(job.error_count as i64)
        .bind(job.created_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn update_job(&self, job: &SyncJobRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                status = ?,
                items_synced = ?,
                items_failed = ?,
                error_count = ?,
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.items_synced as i64)
        .bind(job.items_failed as i64)
        .bind(job.error_count as i64)
        .bind(job.completed_at)
        .bind(job.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::JobNotFound {
                job_id: job.id.to_string(),
            });
        }

        Ok(())
    }

    async fn find_job(&self, id: &SyncJobId) -> Result<Option<SyncJobRecord>> {
        let row = sqlx::query_as::<_, SyncJobRow>(
            r#"
            SELECT id, user_id, sync_type, status, is_scheduled, priority,
                   pair_count, items_synced, items_failed, error_count,
                   created_at, completed_at
            FROM sync_jobs
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(SyncJobRecord::try_from).transpose()
    }

    async fn store_result(&self, result: &CrossServiceSyncResult) -> Result<()> {
        let payload = serde_json::to_string(result)?;

        sqlx::query(
            r#"
            INSERT INTO sync_results (job_id, user_id, success, created_at, payload)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET
                success = excluded.success,
                payload = excluded.payload
            "#,
        )
        .bind(result.job_id.as_str())
        .bind(&result.user_id)
        .bind(result.success)
        .bind(result.completed_at.timestamp_millis())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_result(&self, id: &SyncJobId) -> Result<Option<CrossServiceSyncResult>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM sync_results WHERE job_id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| SyncError::Database(e.to_string()))?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(SyncError::from))
            .transpose()
    }

    async fn get_user_results(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
        success_only: bool,
    ) -> Result<Vec<CrossServiceSyncResult>> {
        let payloads: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT payload FROM sync_results
            WHERE user_id = ? AND (? = 0 OR success = 1)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(success_only)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(SyncError::from))
            .collect()
    }

    async fn upsert_schedule(&self, request: &SyncJobRequest) -> Result<()> {
        let schedule = request.schedule.as_ref().ok_or(SyncError::MissingSchedule)?;
        let next_run = schedule
            .next_run
            .map(|t| t.timestamp_millis())
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let payload = serde_json::to_string(request)?;

        sqlx::query(
            r#"
            INSERT INTO sync_schedules (user_id, sync_type, enabled, next_run, request, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, sync_type) DO UPDATE SET
                enabled = excluded.enabled,
                next_run = excluded.next_run,
                request = excluded.request,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&request.user_id)
        .bind(request.sync_type.as_str())
        .bind(schedule.enabled)
        .bind(next_run)
        .bind(payload)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn disable_schedule(&self, user_id: &str, sync_type: SyncType) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_schedules SET enabled = 0, updated_at = ?
            WHERE user_id = ? AND sync_type = ?
            "#,
        )
        .bind(Utc::now().timestamp_millis())
        .bind(user_id)
        .bind(sync_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_schedules(&self, not_before: DateTime<Utc>) -> Result<Vec<SyncJobRequest>> {
        let payloads: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT request FROM sync_schedules
            WHERE enabled = 1 AND next_run >= ?
            ORDER BY next_run ASC
            "#,
        )
        .bind(not_before.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(SyncError::from))
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
