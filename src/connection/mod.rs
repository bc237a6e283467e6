//! Live connection to the quote server
//!
//! The connection lifecycle lives in a pure state machine
//! ([`ConnectionMachine`]); [`ConnectionManager`] runs it on a tokio task,
//! owns the transport and deadlines, and publishes everything it learns into
//! the update bus.

mod machine;
mod manager;
pub mod protocol;
mod reconnect;
mod transport;
mod types;

pub use machine::{Announcement, ConnectionMachine, Effect, Input};
pub use manager::ConnectionManager;
pub use protocol::{ProtocolError, ServerMessage};
pub use reconnect::RetryPolicy;
pub use transport::{
    Connector, TransportCommand, TransportError, TransportEvent, TransportHandle, TransportLink,
    WsConnector,
};
pub use types::{ConnectionConfig, ConnectionError, ConnectionState, StateChange};
