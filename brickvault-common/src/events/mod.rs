//! Event types and event bus
//!
//! Events are broadcast over a `tokio::sync::broadcast` channel. The HTTP
//! layer forwards them to connected UIs as Server-Sent Events.
//!
//! The notification sink contract used by the UI (`show_success`,
//! `show_error`, `show_warning`) is implemented by [`EventBus`] as
//! [`BrickEvent::Notification`] events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Kind of entity an enrichment run targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentKind {
    Parts,
    Minifigs,
    Prices,
}

impl EnrichmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentKind::Parts => "parts",
            EnrichmentKind::Minifigs => "minifigs",
            EnrichmentKind::Prices => "prices",
        }
    }
}

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Error,
    Warning,
}

/// Where the UI should place a toast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationPosition {
    TopLeft,
    TopCenter,
    #[default]
    TopRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// Display options for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub position: NotificationPosition,
    /// Milliseconds before the toast closes, `None` keeps it open
    pub auto_close_delay_ms: Option<u64>,
}

impl Default for NotificationOptions {
    fn default() -> Self {
        Self {
            position: NotificationPosition::TopRight,
            auto_close_delay_ms: Some(5_000),
        }
    }
}

/// Events broadcast by the metadata cache layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BrickEvent {
    /// A background enrichment run was accepted
    EnrichmentStarted {
        batch_id: Uuid,
        kind: EnrichmentKind,
        total_ids: usize,
        timestamp: DateTime<Utc>,
    },

    /// One batch of a run finished (before the inter-batch cooldown)
    EnrichmentBatchCompleted {
        batch_id: Uuid,
        kind: EnrichmentKind,
        batch_index: usize,
        processed: usize,
        total_ids: usize,
        rate_limited: bool,
        timestamp: DateTime<Utc>,
    },

    /// A background enrichment run finished
    EnrichmentCompleted {
        batch_id: Uuid,
        kind: EnrichmentKind,
        processed: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// An element id was confirmed missing upstream
    PartInvalidated {
        element_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A live price snapshot was replaced
    PriceRefreshed {
        minifig_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Toast for the UI notification area
    Notification {
        level: NotificationLevel,
        message: String,
        options: NotificationOptions,
        timestamp: DateTime<Utc>,
    },
}

impl BrickEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            BrickEvent::EnrichmentStarted { .. } => "EnrichmentStarted",
            BrickEvent::EnrichmentBatchCompleted { .. } => "EnrichmentBatchCompleted",
            BrickEvent::EnrichmentCompleted { .. } => "EnrichmentCompleted",
            BrickEvent::PartInvalidated { .. } => "PartInvalidated",
            BrickEvent::PriceRefreshed { .. } => "PriceRefreshed",
            BrickEvent::Notification { .. } => "Notification",
        }
    }
}

/// Notification sink consumed by the UI layer
pub trait NotificationSink: Send + Sync {
    fn notify(&self, level: NotificationLevel, message: &str, options: NotificationOptions);

    fn show_success(&self, message: &str, options: NotificationOptions) {
        self.notify(NotificationLevel::Success, message, options);
    }

    fn show_error(&self, message: &str, options: NotificationOptions) {
        self.notify(NotificationLevel::Error, message, options);
    }

    fn show_warning(&self, message: &str, options: NotificationOptions) {
        self.notify(NotificationLevel::Warning, message, options);
    }
}

/// Broadcast bus for [`BrickEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BrickEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BrickEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: BrickEvent) -> Result<usize, broadcast::error::SendError<BrickEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: BrickEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl NotificationSink for EventBus {
    fn notify(&self, level: NotificationLevel, message: &str, options: NotificationOptions) {
        self.emit_lossy(BrickEvent::Notification {
            level,
            message: message.to_string(),
            options,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(BrickEvent::PartInvalidated {
            element_id: "99999999".to_string(),
            timestamp: Utc::now(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "PartInvalidated");
    }

    #[test]
    fn test_emit_without_subscribers_errors_but_lossy_does_not_panic() {
        let bus = EventBus::new(10);
        let event = BrickEvent::PriceRefreshed {
            minifig_id: "fig-000001".to_string(),
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
    }

    #[tokio::test]
    async fn test_notification_sink_emits_notification_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.show_warning("Catalog is rate limiting us", NotificationOptions::default());

        match rx.recv().await.unwrap() {
            BrickEvent::Notification { level, message, options, .. } => {
                assert_eq!(level, NotificationLevel::Warning);
                assert_eq!(message, "Catalog is rate limiting us");
                assert_eq!(options.position, NotificationPosition::TopRight);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(BrickEvent::EnrichmentStarted {
            batch_id: Uuid::nil(),
            kind: EnrichmentKind::Parts,
            total_ids: 3,
            timestamp: Utc::now(),
        })
        .unwrap();

        assert_eq!(json["type"], "EnrichmentStarted");
        assert_eq!(json["kind"], "parts");
    }
}
