//! Client wiring for the Urban Flow dashboard.
//!
//! [`SyncClient`] connects the transport to the event bus and canonical
//! store; [`CommandSender`] is the outbound path. [`RestClient`] covers the
//! backend's one-shot REST reads, and [`ClientConfig`] loads settings from
//! YAML and the environment.
//!
//! # Modules
//!
//! - [`config`] -- YAML + environment configuration
//! - [`sync`] -- Transport -> decode -> bus -> store pipeline
//! - [`commands`] -- User intents to command frames
//! - [`rest`] -- REST collaborator client
//! - [`logging`] -- `tracing` subscriber setup
//! - [`error`] -- Client error types

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod rest;
pub mod sync;

pub use commands::{CommandOutcome, CommandSender, DEFAULT_SCENARIO, Intent};
pub use config::{ClientConfig, ConfigError, LogFormat};
pub use error::ClientError;
pub use rest::{RestClient, RestError};
pub use sync::{CONNECTION_EXHAUSTED, SyncClient};
