//! Error types for the Urban Flow client.
//!
//! Each layer keeps its own typed error; [`ClientError`] wraps them for
//! callers that drive the whole client (the console binary).

use urbanflow_transport::TransportError;

use crate::config::ConfigError;
use crate::rest::RestError;

/// Errors that can occur while setting up or running the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The streaming connection failed terminally.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A REST call failed.
    #[error("REST error: {0}")]
    Rest(#[from] RestError),

    /// Logging could not be initialized.
    #[error("logging setup failed: {0}")]
    Logging(String),
}
