//! Streaming wire messages (JSON objects tagged by `type`)

use serde::{Deserialize, Serialize};

use crate::event_bus::Event;

/// Message sent from client to server
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Add event types to this connection's filter
    Subscribe {
        #[serde(default)]
        event_types: Vec<String>,
    },

    /// Liveness check, answered with `pong`
    Ping,
}

/// Message sent from server to client
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full subscription set after a subscribe
    SubscriptionConfirmed { event_types: Vec<String> },

    /// Event delivery
    Event { event: Event },

    Pong,
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
