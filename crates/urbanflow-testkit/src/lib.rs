//! Test doubles for the Urban Flow streaming pipeline.
//!
//! Both doubles implement the transport's [`urbanflow_transport::Connector`]
//! contract, so tests exercise the production transport and pipeline code
//! unchanged:
//!
//! - [`ScriptedConnector`] -- connection outcomes and server frames driven
//!   step by step from the test
//! - [`MockBackend`] -- answers commands the way the simulation backend
//!   does
//!
//! [`fixtures`] builds entities and wire-shaped payloads.

pub mod backend;
pub mod fixtures;
pub mod scripted;

pub use backend::{MockBackend, MockConnection};
pub use scripted::{ScriptedConnection, ScriptedConnector, ServerSession};
