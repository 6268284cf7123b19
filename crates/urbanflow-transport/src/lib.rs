//! Reconnecting streaming transport for the Urban Flow dashboard.
//!
//! Owns exactly one logical connection to the simulation backend. Inbound
//! text frames and lifecycle changes are delivered in order as
//! [`TransportEvent`]s; outbound frames are fire-and-forget.
//!
//! # Modules
//!
//! - [`backoff`] -- Reconnect delay policy
//! - [`connector`] -- The connection seam used by the supervisor
//! - [`transport`] -- The supervisor and its public handle
//! - [`ws`] -- `WebSocket` connector on `tokio-tungstenite`
//! - [`error`] -- Transport error types

pub mod backoff;
pub mod connector;
pub mod error;
pub mod transport;
pub mod ws;

pub use backoff::{BackoffStrategy, ReconnectPolicy};
pub use connector::{Connection, Connector};
pub use error::TransportError;
pub use transport::{
    ConnectionState, DisconnectReason, Transport, TransportConfig, TransportEvent,
};
pub use ws::{WsConnection, WsConnector};
