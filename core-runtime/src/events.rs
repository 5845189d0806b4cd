//! # Event Bus System
//!
//! Broadcasts sync lifecycle events using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: strongly-typed enums for sync jobs and schedules
//! - **EventBus**: central broadcast channel for publishing events
//! - **Subscription Management**: multiple subscribers listen independently
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Queued {
//!         user_id: "user-1".to_string(),
//!         sync_type: "favorites".to_string(),
//!         scheduled: false,
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Sync job queued");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::SendError, Receiver};

pub use crate::config::DEFAULT_EVENT_BUFFER_SIZE;

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync-related events
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::ScheduleDeferred { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Events emitted by the sync engine and scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A job was accepted onto a queue.
    Queued {
        user_id: String,
        sync_type: String,
        /// Whether the job came from the scheduler.
        scheduled: bool,
    },
    /// A worker started processing a job.
    Started {
        job_id: String,
        user_id: String,
        sync_type: String,
        pair_count: usize,
    },
    /// A job finished with zero failed items.
    Completed {
        job_id: String,
        total_synced: u64,
        duration_ms: u64,
    },
    /// A job finished with at least one failed item.
    Failed {
        job_id: String,
        total_synced: u64,
        total_failed: u64,
        error_count: usize,
    },
    /// A recurring schedule was registered or replaced.
    ScheduleRegistered {
        user_id: String,
        sync_type: String,
        /// Next run as Unix milliseconds.
        next_run: i64,
    },
    /// A due schedule could not be enqueued and will be retried next tick.
    ScheduleDeferred { user_id: String, sync_type: String },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Queued { .. } => "Sync job queued",
            SyncEvent::Started { .. } => "Sync job started",
            SyncEvent::Completed { .. } => "Sync job completed successfully",
            SyncEvent::Failed { .. } => "Sync job finished with failures",
            SyncEvent::ScheduleRegistered { .. } => "Recurring sync scheduled",
            SyncEvent::ScheduleDeferred { .. } => "Scheduled sync deferred, queue full",
        }
    }
}

/// Central event bus for publishing and subscribing to core events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(job_id: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Completed {
            job_id: job_id.to_string(),
            total_synced: 3,
            duration_ms: 42,
        })
    }

    #[test]
    fn test_emit_without_subscribers_is_an_error() {
        let bus = EventBus::new(8);
        assert!(bus.emit(completed("job-1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_event() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.emit(completed("job-1")).unwrap(), 2);

        assert_eq!(first.recv().await.unwrap(), completed("job-1"));
        assert_eq!(second.recv().await.unwrap(), completed("job-1"));
    }

    #[test]
    fn test_severity() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            job_id: "job-1".to_string(),
            total_synced: 0,
            total_failed: 2,
            error_count: 2,
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(completed("job-2").severity(), EventSeverity::Info);

        let deferred = CoreEvent::Sync(SyncEvent::ScheduleDeferred {
            user_id: "u".to_string(),
            sync_type: "favorites".to_string(),
        });
        assert_eq!(deferred.severity(), EventSeverity::Warning);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(completed("job-9")).unwrap();
        assert_eq!(json["type"], "Sync");
        assert_eq!(json["payload"]["event"], "Completed");
        assert_eq!(json["payload"]["job_id"], "job-9");
    }
}
