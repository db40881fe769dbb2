// Live streaming connections
//
// The registry is transport-agnostic; the WebSocket endpoint in `api::stream`
// decodes wire messages and calls into it.

pub mod connection;
pub mod protocol;
pub mod registry;

pub use connection::{ChannelConnection, Connection, SendError};
pub use protocol::{ClientMessage, ServerMessage};
pub use registry::{BroadcastReport, ConnectionId, ConnectionRegistry};
