//! # Core Configuration Module
//!
//! Provides configuration management for the sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the settings the engine needs at startup. It enforces
//! fail-fast validation so a misconfigured engine never starts.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::{CoreConfig, SyncSettings};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_url("sqlite::memory:")
//!     .sync_settings(
//!         SyncSettings::default()
//!             .with_manual_workers(2)
//!             .with_scheduler_tick(Duration::from_secs(30)),
//!     )
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.sync.manual_workers, 2);
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Missing database URL
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing database url");
//! ```

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// How much of a sync result is handed to the metadata store.
///
/// The engine never stores raw service payloads, but a full result still
/// contains the canonical items that were moved. `CountsOnly` keeps totals,
/// errors and timings and drops the per-pair item lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultRetention {
    /// Persist the result exactly as produced
    Full,
    /// Persist counts, errors and timings only
    #[default]
    CountsOnly,
}

/// Worker, queue and pacing settings for the sync engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Workers dedicated to the manual queue
    pub manual_workers: usize,

    /// Workers dedicated to the automatic (scheduled) queue
    pub auto_workers: usize,

    /// Capacity of the bounded manual queue
    pub manual_queue_capacity: usize,

    /// Capacity of the bounded automatic queue
    pub auto_queue_capacity: usize,

    /// How often the scheduler looks for due schedules
    pub scheduler_tick: Duration,

    /// Client-side pacing delay between successive add calls
    pub item_delay: Duration,

    /// Threshold used when a request does not carry its own
    pub default_match_threshold: f64,

    /// Policy applied before results reach the metadata store
    pub result_retention: ResultRetention,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            manual_workers: 4,
            auto_workers: 4,
            manual_queue_capacity: 100,
            auto_queue_capacity: 100,
            scheduler_tick: Duration::from_secs(60),
            item_delay: Duration::from_millis(100),
            default_match_threshold: 0.8,
            result_retention: ResultRetention::default(),
        }
    }
}

impl SyncSettings {
    pub fn with_manual_workers(mut self, workers: usize) -> Self {
        self.manual_workers = workers;
        self
    }

    pub fn with_auto_workers(mut self, workers: usize) -> Self {
        self.auto_workers = workers;
        self
    }

    pub fn with_manual_queue_capacity(mut self, capacity: usize) -> Self {
        self.manual_queue_capacity = capacity;
        self
    }

    pub fn with_auto_queue_capacity(mut self, capacity: usize) -> Self {
        self.auto_queue_capacity = capacity;
        self
    }

    pub fn with_scheduler_tick(mut self, tick: Duration) -> Self {
        self.scheduler_tick = tick;
        self
    }

    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self
    }

    pub fn with_default_match_threshold(mut self, threshold: f64) -> Self {
        self.default_match_threshold = threshold;
        self
    }

    pub fn with_result_retention(mut self, retention: ResultRetention) -> Self {
        self.result_retention = retention;
        self
    }

    /// Validates the settings
    ///
    /// Each queue must keep at least one dedicated worker so a burst on one
    /// queue cannot starve the other.
    pub fn validate(&self) -> Result<()> {
        if self.manual_workers == 0 {
            return Err(Error::Config(
                "Manual queue needs at least one worker".to_string(),
            ));
        }

        if self.auto_workers == 0 {
            return Err(Error::Config(
                "Automatic queue needs at least one worker".to_string(),
            ));
        }

        if self.manual_queue_capacity == 0 || self.auto_queue_capacity == 0 {
            return Err(Error::Config(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.scheduler_tick.is_zero() {
            return Err(Error::Config(
                "Scheduler tick interval must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.default_match_threshold) {
            return Err(Error::Config(format!(
                "Default match threshold must be within [0, 1], got {}",
                self.default_match_threshold
            )));
        }

        Ok(())
    }
}

/// Core configuration for the sync engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// SQLite connection string for the metadata store
    pub database_url: String,

    /// Buffer size of the event bus
    pub event_buffer_size: usize,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Engine settings
    pub sync: SyncSettings,
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::Config("Database URL cannot be empty".to_string()));
        }

        if !self.database_url.starts_with("sqlite:") {
            return Err(Error::Config(format!(
                "Unsupported database URL '{}': only sqlite URLs are supported",
                self.database_url
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.sync.validate()
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database_url: Option<String>,
    event_buffer_size: Option<usize>,
    logging: Option<LoggingConfig>,
    sync: Option<SyncSettings>,
}

impl CoreConfigBuilder {
    /// Sets the metadata store connection string.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the logging configuration.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Sets the engine settings.
    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    /// Builds the final [`CoreConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database URL is missing or any setting fails
    /// validation.
    pub fn build(self) -> Result<CoreConfig> {
        let database_url = self.database_url.ok_or_else(|| Error::CapabilityMissing {
            capability: "database_url".to_string(),
            message: "A sqlite database URL is required for the metadata store. \
                      Use 'sqlite::memory:' for an ephemeral store."
                .to_string(),
        })?;

        let config = CoreConfig {
            database_url,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            logging: self.logging.unwrap_or_default(),
            sync: self.sync.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
