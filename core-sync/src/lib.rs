//! # Sync Engine Module
//!
//! Moves user content between pairs of third-party services.
//!
//! ## Overview
//!
//! This module owns the whole job lifecycle:
//! - Admission of manual and scheduled sync requests with backpressure
//! - Worker pools draining a manual and an automatic queue
//! - Per-pair directional sync: fetch, filter, transform, add
//! - Persistence of job records and results via a metadata store
//! - Per-sync-type metrics
//!
//! ## Components
//!
//! - **Requests** (`request`): `SyncJobRequest`, `ServicePair`, options and schedules
//! - **Results** (`result`): `CrossServiceSyncResult` and captured `SyncFailure`s
//! - **Job Records** (`job`): `Running → Completed | Failed` metadata records
//! - **Capabilities** (`provider`): `ServiceProvider` and `ItemAdder` traits
//! - **Registry** (`registry`): concurrent service map with per-service rate limiters
//! - **Metadata Store** (`repository`): `MetadataStore` trait and SQLite implementation
//! - **Scheduler** (`scheduler`): recurring syncs feeding the automatic queue
//! - **Pipeline** (`pipeline`): per-job, per-pair and directional execution
//! - **Engine** (`engine`): queues, workers and lifecycle

pub mod engine;
pub mod error;
pub mod job;
pub mod metrics;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod repository;
pub mod request;
pub mod result;
pub mod scheduler;

pub use engine::{QueueStats, SyncEngine, SyncEngineBuilder};
pub use error::{Result, SyncError};
pub use job::{JobStatus, SyncJobId, SyncJobRecord};
pub use metrics::{SyncMetrics, SyncTypeMetrics};
pub use pipeline::{DirectionalOutcome, JobProcessor, ServiceEndpoint};
pub use provider::{ItemAdder, RateLimit, ServiceItem, ServiceProvider, UserDataResponse};
pub use registry::{ServiceHandle, ServiceRegistry};
pub use repository::{MetadataStore, SqliteMetadataStore};
pub use request::{
    ConflictPolicy, Priority, ScheduleSpec, ServicePair, SyncJobRequest, SyncMode, SyncOptions,
};
pub use result::{CrossServiceSyncResult, ServicePairResult, SyncErrorKind, SyncFailure};
pub use scheduler::Scheduler;
