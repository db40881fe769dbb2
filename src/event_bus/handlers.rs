//! Built-in wildcard subscribers: persistence and live broadcast

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::bus::EventBus;
use super::handler::EventHandler;
use super::kinds::EventKind;
use super::store::EventStore;
use super::types::Event;
use crate::ws::ConnectionRegistry;

/// Appends every event to the store
///
/// A store error fails this handler (and is logged by the bus); it never
/// reaches the publisher.
pub struct PersistHandler {
    store: Arc<dyn EventStore>,
}

impl PersistHandler {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for PersistHandler {
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.store.save_event(event).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "persist"
    }
}

/// Forwards every event to the live streaming connections
pub struct BroadcastHandler {
    connections: Arc<ConnectionRegistry>,
}

impl BroadcastHandler {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl EventHandler for BroadcastHandler {
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let report = self.connections.broadcast_event(event).await;
        debug!(
            event_id = %event.id,
            delivered = report.delivered,
            removed = report.removed.len(),
            "event broadcast"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "broadcast"
    }
}

/// Attach persistence, then live broadcast, as wildcard subscribers
///
/// Persisting first means a client that reacts to a broadcast by querying
/// the store finds the event there.
pub fn install(bus: &EventBus, store: Arc<dyn EventStore>, connections: Arc<ConnectionRegistry>) {
    bus.subscribe(EventKind::WILDCARD, PersistHandler::new(store));
    bus.subscribe(EventKind::WILDCARD, BroadcastHandler::new(connections));
}
