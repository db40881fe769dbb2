use chrono::{DateTime, SubsecRound, Utc};
use gotcha::Schematic;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Core event structure for the Event Bus
///
/// Events are immutable once constructed: the bus, the store and the
/// connection registry only ever see shared references or clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schematic)]
pub struct Event {
    /// Unique identifier (UUID v4), stamped at creation and never reused
    pub id: Uuid,

    /// Event type (semantic tag)
    /// Examples: "user.created", "task.completed", "order.shipped"
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event-specific payload, opaque to the bus
    pub data: serde_json::Value,

    /// Creation time (ISO 8601 on the wire)
    pub timestamp: DateTime<Utc>,

    /// Optional user that caused the event
    pub user_id: Option<String>,

    /// Optional id grouping causally related events
    pub correlation_id: Option<String>,
}

/// Rejected event construction
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidEvent {
    #[error("event type must not be empty")]
    EmptyType,
}

impl Event {
    /// Create a new event with a fresh id and the current time
    ///
    /// The timestamp is truncated to microseconds, the precision Postgres
    /// keeps, so a stored copy compares equal to the in-memory one.
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            data,
            timestamp: Utc::now().trunc_subsecs(6),
            user_id: None,
            correlation_id: None,
        }
    }

    /// Create an event with all optional identifiers at once
    pub fn create(
        event_type: impl Into<String>,
        data: serde_json::Value,
        user_id: Option<String>,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            user_id,
            correlation_id,
            ..Self::new(event_type, data)
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Check the invariants that cannot be expressed in the type
    pub fn validate(&self) -> Result<(), InvalidEvent> {
        if self.event_type.trim().is_empty() {
            return Err(InvalidEvent::EmptyType);
        }
        Ok(())
    }

    /// Serialize to the JSON shape used on the wire and on the transport
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse an event from its wire JSON shape
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
