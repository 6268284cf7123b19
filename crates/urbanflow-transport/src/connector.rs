//! The seam between the reconnect supervisor and a physical connection.
//!
//! Production code uses [`crate::WsConnector`]; tests substitute a
//! scripted double. The supervisor never branches on which one it has.

use std::future::Future;

use crate::error::TransportError;

/// One open, bidirectional text-frame connection.
pub trait Connection: Send + 'static {
    /// Wait for the next inbound text frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly.
    /// Must be cancel-safe: the supervisor races it against outbound
    /// sends and shutdown.
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;

    /// Send one text frame.
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the connection, best effort.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens [`Connection`]s to a fixed endpoint.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced.
    type Conn: Connection;

    /// Open a new connection.
    fn connect(&self) -> impl Future<Output = Result<Self::Conn, TransportError>> + Send;

    /// Endpoint description for logs.
    fn endpoint(&self) -> String;
}
