//! Relays: route opaque envelopes between connected peers by id.
//!
//! - [`MemoryRelay`]: in-process router, also a [`crate::transport::TransportFactory`]
//! - [`RelayServer`]: WebSocket relay speaking the [`protocol`] frames
//! - [`WebSocketTransportFactory`]: client side of the WebSocket relay

mod error;
pub mod memory;
pub mod protocol;
pub mod server;
pub mod websocket;

pub use error::RelayError;
pub use memory::MemoryRelay;
pub use server::RelayServer;
pub use websocket::WebSocketTransportFactory;
