//! Distributed transport
//!
//! Forwards serialized events to other processes. Every event goes to a
//! channel named `<prefix><event type>` (`events:user.created` by default)
//! with the event's wire JSON as payload.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use conservator::{Executor, PooledConnection};
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use super::types::Event;

pub const DEFAULT_CHANNEL_PREFIX: &str = "events:";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("publish to {channel} failed: {message}")]
    Publish { channel: String, message: String },

    #[error("publish to {channel} timed out")]
    Timeout { channel: String },

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Pub/sub channel used to propagate events to other processes
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError>;

    /// Release the underlying connection. Must be idempotent.
    async fn close(&self);
}

/// Channel an event of the given type is forwarded on
pub fn channel_for(prefix: &str, event_type: &str) -> String {
    format!("{}{}", prefix, event_type)
}

/// Parse a forwarded payload back into an event
pub fn decode_forwarded(payload: &str) -> Result<Event, TransportError> {
    Ok(Event::from_json(payload)?)
}

// ============================================================================
// Postgres NOTIFY
// ============================================================================

/// Transport over Postgres `NOTIFY`, sharing the store's connection pool
pub struct PgNotifyTransport {
    pool: Mutex<Option<Arc<PooledConnection>>>,
}

impl PgNotifyTransport {
    pub fn new(pool: Arc<PooledConnection>) -> Self {
        Self {
            pool: Mutex::new(Some(pool)),
        }
    }
}

#[async_trait]
impl Transport for PgNotifyTransport {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        let pool = self.pool.lock().await.clone().ok_or(TransportError::Closed)?;

        let publish_error = |e: conservator::Error| TransportError::Publish {
            channel: channel.to_string(),
            message: e.to_string(),
        };

        let conn = pool.get().await.map_err(publish_error)?;
        conn.execute("SELECT pg_notify($1, $2)", &[&channel, &payload])
            .await
            .map_err(publish_error)?;

        Ok(())
    }

    async fn close(&self) {
        if self.pool.lock().await.take().is_some() {
            debug!("postgres notify transport released");
        }
    }
}

// ============================================================================
// In-process broadcast
// ============================================================================

/// A message as seen by a [`LocalTransport`] receiver
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessage {
    pub channel: String,
    pub payload: String,
}

/// In-process transport backed by a broadcast channel
///
/// Useful for single-node deployments and tests. Sending with no receivers
/// is not an error.
pub struct LocalTransport {
    sender: broadcast::Sender<TransportMessage>,
    closed: AtomicBool,
}

impl LocalTransport {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            closed: AtomicBool::new(false),
        }
    }

    /// Receive every message published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<TransportMessage> {
        self.sender.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let _ = self.sender.send(TransportMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
