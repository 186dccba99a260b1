//! WebSocket transport for the realtime client

pub mod connection;

pub use connection::{ConnectionState, WebSocketConnection, WebSocketError};
