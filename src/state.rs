use std::ops::Deref;
use std::sync::Arc;

use conservator::PooledConnection;
use gotcha::axum::extract::FromRef;
use gotcha::GotchaContext;
use tracing::info;

use crate::config::{Settings, TransportKind};
use crate::event_bus::handlers;
use crate::event_bus::{
    EventBus, EventStore, LocalTransport, MemoryEventStore, PgEventStore, PgNotifyTransport,
    Transport,
};
use crate::ws::ConnectionRegistry;

// ============================================================================
// Wrappers for state extraction
// ============================================================================

/// Event bus wrapper for state extraction
#[derive(Clone)]
pub struct Bus(pub Arc<EventBus>);

impl Deref for Bus {
    type Target = EventBus;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Event store wrapper for state extraction
#[derive(Clone)]
pub struct Store(pub Arc<dyn EventStore>);

impl Deref for Store {
    type Target = dyn EventStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Connection registry wrapper for state extraction
#[derive(Clone)]
pub struct Connections(pub Arc<ConnectionRegistry>);

impl Deref for Connections {
    type Target = Arc<ConnectionRegistry>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// Application state
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<EventBus>,
    pub store: Arc<dyn EventStore>,
    pub connections: Arc<ConnectionRegistry>,
    pub settings: Settings,
}

impl AppState {
    /// Wire bus, store and registry together, with persistence and live
    /// broadcast installed as wildcard subscribers
    pub fn new(
        bus: EventBus,
        store: Arc<dyn EventStore>,
        connections: Arc<ConnectionRegistry>,
        settings: Settings,
    ) -> Self {
        handlers::install(&bus, store.clone(), connections.clone());
        Self {
            bus: Arc::new(bus),
            store,
            connections,
            settings,
        }
    }

    /// Build the production state: Postgres store and the configured
    /// transport over one shared pool
    pub async fn connect(settings: Settings) -> crate::Result<Self> {
        let pool = Arc::new(PooledConnection::from_url(&settings.database_url)?);

        let store = Arc::new(PgEventStore::new(pool.clone()));
        store.ensure_schema().await?;

        let transport: Option<Arc<dyn Transport>> = match settings.transport.kind {
            TransportKind::Postgres => Some(Arc::new(PgNotifyTransport::new(pool))),
            TransportKind::Local => Some(Arc::new(LocalTransport::default())),
            TransportKind::Disabled => None,
        };
        info!(transport = ?settings.transport.kind, "event bus transport selected");

        let bus = match transport {
            Some(transport) => EventBus::with_transport(transport),
            None => EventBus::new(),
        }
        .channel_prefix(settings.transport.channel_prefix.clone())
        .forward_timeout(settings.transport.timeout());

        let connections = Arc::new(ConnectionRegistry::with_send_timeout(
            settings.connections.send_timeout(),
        ));

        Ok(Self::new(bus, store, connections, settings))
    }

    /// Release resources held past the request lifecycle
    pub async fn shutdown(&self) {
        self.bus.close().await;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(
            EventBus::new(),
            Arc::new(MemoryEventStore::new()),
            Arc::new(ConnectionRegistry::new()),
            Settings::default(),
        )
    }
}

// Allow extracting wrappers from GotchaContext
impl FromRef<GotchaContext<AppState, Settings>> for Bus {
    fn from_ref(ctx: &GotchaContext<AppState, Settings>) -> Self {
        Bus(ctx.state.bus.clone())
    }
}

impl FromRef<GotchaContext<AppState, Settings>> for Store {
    fn from_ref(ctx: &GotchaContext<AppState, Settings>) -> Self {
        Store(ctx.state.store.clone())
    }
}

impl FromRef<GotchaContext<AppState, Settings>> for Connections {
    fn from_ref(ctx: &GotchaContext<AppState, Settings>) -> Self {
        Connections(ctx.state.connections.clone())
    }
}

impl FromRef<GotchaContext<AppState, Settings>> for Settings {
    fn from_ref(ctx: &GotchaContext<AppState, Settings>) -> Self {
        ctx.state.settings.clone()
    }
}

// Same extractors over a bare AppState (plain axum routers, tests)
impl FromRef<AppState> for Bus {
    fn from_ref(state: &AppState) -> Self {
        Bus(state.bus.clone())
    }
}

impl FromRef<AppState> for Store {
    fn from_ref(state: &AppState) -> Self {
        Store(state.store.clone())
    }
}

impl FromRef<AppState> for Connections {
    fn from_ref(state: &AppState) -> Self {
        Connections(state.connections.clone())
    }
}

impl FromRef<AppState> for Settings {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}
