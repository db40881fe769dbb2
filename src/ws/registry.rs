use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{Mutex as SendLock, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::connection::{Connection, SendError};
use super::protocol::ServerMessage;
use crate::event_bus::{Event, EventKind};

pub type ConnectionId = Uuid;

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

struct ConnectionEntry {
    conn: Arc<dyn Connection>,
    /// Empty means unfiltered: the connection receives every event
    subscriptions: Mutex<BTreeSet<String>>,
    /// Serializes sends to this connection
    send_lock: SendLock<()>,
    /// Set by the first failed send; no send is attempted afterwards
    failed: AtomicBool,
}

impl ConnectionEntry {
    fn subscriptions(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        match self.subscriptions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn wants(&self, event_type: &str) -> bool {
        if self.failed.load(Ordering::Acquire) {
            return false;
        }
        let subs = self.subscriptions();
        subs.is_empty() || subs.contains(event_type) || subs.contains(EventKind::WILDCARD)
    }
}

/// Result of a broadcast: how many sends succeeded and which connections
/// were dropped because their send failed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub removed: Vec<ConnectionId>,
}

/// Live streaming connections and their subscription filters (in-memory)
///
/// The connection map is guarded by an async `RwLock`: adds and removals
/// take the write side, broadcasts snapshot their targets under the read
/// side. Each connection's subscription set has its own lock so updating one
/// filter never blocks another connection.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionEntry>>>,
    send_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }

    /// Registry that gives up on a single send after `send_timeout`
    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            send_timeout,
        }
    }

    /// Register a connection with an empty (unfiltered) subscription set
    pub async fn connect(&self, conn: Arc<dyn Connection>) -> ConnectionId {
        let id = Uuid::new_v4();
        let entry = Arc::new(ConnectionEntry {
            conn,
            subscriptions: Mutex::new(BTreeSet::new()),
            send_lock: SendLock::new(()),
            failed: AtomicBool::new(false),
        });

        let mut connections = self.connections.write().await;
        connections.insert(id, entry);
        info!(connection_id = %id, total = connections.len(), "connection registered");

        id
    }

    /// Remove a connection and its filter. Returns false if it was not
    /// registered.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(&id).is_some();
        if removed {
            info!(connection_id = %id, total = connections.len(), "connection unregistered");
        }
        removed
    }

    /// Add event types to a connection's filter and confirm the full set
    ///
    /// Returns the resulting set, or `None` if the connection is unknown.
    pub async fn subscribe<I, S>(&self, id: ConnectionId, event_types: I) -> Option<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.entry(id).await?;

        let current: Vec<String> = {
            let mut subs = entry.subscriptions();
            subs.extend(event_types.into_iter().map(Into::into));
            subs.iter().cloned().collect()
        };
        debug!(connection_id = %id, event_types = ?current, "subscriptions updated");

        let confirmation = ServerMessage::SubscriptionConfirmed {
            event_types: current.clone(),
        };
        match confirmation.to_json() {
            Ok(json) => {
                if let Err(e) = self.send_entry(&entry, json).await {
                    warn!(connection_id = %id, error = %e, "failed to confirm subscription");
                    self.disconnect(id).await;
                }
            }
            Err(e) => error!(error = %e, "failed to encode subscription confirmation"),
        }

        Some(current)
    }

    /// Deliver an event to every connection whose filter accepts its type
    pub async fn broadcast_event(&self, event: &Event) -> BroadcastReport {
        let message = ServerMessage::Event {
            event: event.clone(),
        };
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(event_id = %event.id, error = %e, "failed to encode event");
                return BroadcastReport::default();
            }
        };

        let targets: Vec<(ConnectionId, Arc<ConnectionEntry>)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(_, entry)| entry.wants(&event.event_type))
                .map(|(id, entry)| (*id, entry.clone()))
                .collect()
        };

        self.deliver(targets, json).await
    }

    /// Send a raw message to every connection, regardless of filters
    pub async fn broadcast(&self, message: &str) -> BroadcastReport {
        let targets: Vec<(ConnectionId, Arc<ConnectionEntry>)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(_, entry)| !entry.failed.load(Ordering::Acquire))
                .map(|(id, entry)| (*id, entry.clone()))
                .collect()
        };

        self.deliver(targets, message.to_string()).await
    }

    /// Send a message to one connection, dropping it on failure
    pub async fn send_to(&self, id: ConnectionId, message: String) -> Result<(), SendError> {
        let entry = self.entry(id).await.ok_or(SendError::Closed)?;

        if let Err(e) = self.send_entry(&entry, message).await {
            warn!(connection_id = %id, error = %e, "send failed, dropping connection");
            self.disconnect(id).await;
            return Err(e);
        }
        Ok(())
    }

    /// Current filter of a connection, sorted
    pub async fn subscriptions(&self, id: ConnectionId) -> Option<Vec<String>> {
        let entry = self.entry(id).await?;
        let subs = entry.subscriptions();
        Some(subs.iter().cloned().collect())
    }

    pub async fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    async fn entry(&self, id: ConnectionId) -> Option<Arc<ConnectionEntry>> {
        self.connections.read().await.get(&id).cloned()
    }

    async fn send_entry(&self, entry: &ConnectionEntry, message: String) -> Result<(), SendError> {
        let _guard = entry.send_lock.lock().await;
        if entry.failed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }

        let result = tokio::time::timeout(self.send_timeout, entry.conn.send_text(message))
            .await
            .map_err(|_| SendError::Timeout)
            .and_then(|sent| sent);
        if result.is_err() {
            entry.failed.store(true, Ordering::Release);
        }
        result
    }

    /// Send to all targets concurrently; failed targets are disconnected
    ///
    /// A target removed by an overlapping broadcast is not reported twice.
    async fn deliver(
        &self,
        targets: Vec<(ConnectionId, Arc<ConnectionEntry>)>,
        message: String,
    ) -> BroadcastReport {
        let sends = targets.iter().map(|(id, entry)| {
            let message = message.clone();
            async move { (*id, self.send_entry(entry, message).await) }
        });
        let results = join_all(sends).await;

        let mut report = BroadcastReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(connection_id = %id, error = %e, "broadcast send failed, dropping connection");
                    if self.disconnect(id).await {
                        report.removed.push(id);
                    }
                }
            }
        }
        report
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
