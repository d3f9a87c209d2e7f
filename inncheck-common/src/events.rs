//! Event types for the inncheck event system
//!
//! Components receive an [`EventBus`] at construction and report what they do on it;
//! the binary subscribes and forwards events to the log, tests subscribe and assert
//! on the sequence.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::fetch::ErrorKind;

/// Data source queried for a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Bankruptcy registry (bankrot.fedresurs.ru)
    Efrsb,
    /// Arbitration case registry (kad.arbitr.ru)
    KadArbitr,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Efrsb => "efrsb",
            Source::KadArbitr => "kad_arbitr",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request never reached the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Text was not a 10- or 12-digit INN
    BadFormat,
    /// Queue at capacity
    QueueFull,
    /// Service shutting down
    Closed,
}

/// Processing stage of a lookup request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage")]
pub enum RequestStage {
    Queued,
    Fetching { source: Source, attempt: u32 },
    Formatting,
    Delivering { attempt: u32 },
    Done,
}

/// inncheck event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BotEvent {
    /// Request accepted into the queue
    RequestAdmitted {
        inn: String,
        chat_id: i64,
        position: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Request refused at the boundary
    RequestRejected {
        chat_id: i64,
        reason: RejectReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Worker picked a request off the queue
    RequestStarted {
        inn: String,
        chat_id: i64,
        /// Time spent waiting in the queue
        waited_ms: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One retrieval attempt failed
    FetchAttemptFailed {
        inn: String,
        source: Source,
        attempt: u32,
        kind: ErrorKind,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Final outcome for one source (None = success)
    SourceCompleted {
        inn: String,
        source: Source,
        attempts: u32,
        failure: Option<ErrorKind>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A message reached the requester
    MessageDelivered {
        chat_id: i64,
        attempts: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A message could not be delivered and was abandoned
    DeliveryAbandoned {
        chat_id: i64,
        attempts: u32,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Unexpected fault while processing a request
    InternalFault {
        inn: String,
        chat_id: i64,
        stage: RequestStage,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Worker finished a request (report or apology sent or abandoned)
    RequestCompleted {
        inn: String,
        chat_id: i64,
        elapsed_ms: i64,
        faulted: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl BotEvent {
    /// Event type name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            BotEvent::RequestAdmitted { .. } => "RequestAdmitted",
            BotEvent::RequestRejected { .. } => "RequestRejected",
            BotEvent::RequestStarted { .. } => "RequestStarted",
            BotEvent::FetchAttemptFailed { .. } => "FetchAttemptFailed",
            BotEvent::SourceCompleted { .. } => "SourceCompleted",
            BotEvent::MessageDelivered { .. } => "MessageDelivered",
            BotEvent::DeliveryAbandoned { .. } => "DeliveryAbandoned",
            BotEvent::InternalFault { .. } => "InternalFault",
            BotEvent::RequestCompleted { .. } => "RequestCompleted",
        }
    }
}

/// Central event distribution bus
///
/// Backed by `tokio::sync::broadcast`: publishing never blocks, slow subscribers
/// observe `Lagged` instead of stalling producers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BotEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Err` when nobody is subscribed
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: BotEvent) -> Result<usize, broadcast::error::SendError<BotEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: BotEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        let result = bus.emit(BotEvent::RequestRejected {
            chat_id: 1,
            reason: RejectReason::QueueFull,
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        for position in 1..=3 {
            bus.emit_lossy(BotEvent::RequestAdmitted {
                inn: "7707083893".to_string(),
                chat_id: 42,
                position,
                timestamp: chrono::Utc::now(),
            });
        }

        for expected in 1..=3 {
            match rx.recv().await.unwrap() {
                BotEvent::RequestAdmitted { position, .. } => assert_eq!(position, expected),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = BotEvent::InternalFault {
            inn: "7707083893".to_string(),
            chat_id: 7,
            stage: RequestStage::Fetching {
                source: Source::KadArbitr,
                attempt: 2,
            },
            error: "boom".to_string(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "InternalFault");
        assert_eq!(json["stage"]["stage"], "Fetching");
        assert_eq!(json["stage"]["source"], "KadArbitr");
        assert_eq!(event.event_type(), "InternalFault");
    }
}
