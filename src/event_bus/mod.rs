// Event Bus - core module
//
// Events are dispatched to local handlers (type-specific, then wildcard),
// forwarded to a distributed transport, persisted by a wildcard subscriber,
// and streamed to live connections by another.

pub mod bus;
pub mod handler;
pub mod handlers;
pub mod kinds;
pub mod store;
pub mod transport;
pub mod types;

pub use bus::{EventBus, PublishReport};
pub use handler::{EventHandler, handler_fn, sync_handler};
pub use kinds::EventKind;
pub use store::{
    DEFAULT_LIMIT, EventFilter, EventStore, MAX_LIMIT, MemoryEventStore, PgEventStore, StoreError,
};
pub use transport::{LocalTransport, PgNotifyTransport, Transport, TransportError};
pub use types::{Event, InvalidEvent};
