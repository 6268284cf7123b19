//! Shared type definitions for the Urban Flow dashboard.
//!
//! This crate is the single source of truth for the data exchanged with
//! the simulation backend. Data-model types flow downstream to `TypeScript`
//! via `ts-rs` for the dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe string wrappers for entity identifiers
//! - [`enums`] -- Enumeration types (vehicle classes, density, run status)
//! - [`structs`] -- Core entity structs (vehicles, lights, metrics, run state)
//! - [`updates`] -- Partial deltas, run-state patches, full snapshots
//! - [`validate`] -- Numeric invariants checked at the decode boundary
//! - [`envelope`] -- Wire envelope, typed messages, frame decoding
//! - [`command`] -- Outbound command frames

pub mod command;
pub mod enums;
pub mod envelope;
pub mod ids;
pub mod structs;
pub mod updates;
pub mod validate;

// Re-export all public types at crate root for convenience.
pub use command::ClientCommand;
pub use enums::{
    AlertPriority, NotificationLevel, PerformanceTier, RunStatus, TrafficDensity, VehicleType,
};
pub use envelope::{
    ConnectionNotice, DecodeError, EmergencyAlert, Envelope, Message, MessageKind, Notification,
    ServerError, Timestamp, decode_frame,
};
pub use ids::{ScenarioId, TrafficLightId, VehicleId};
pub use structs::{
    Position, RunState, Scenario, SimulationMetrics, TrafficLight, TrafficLightPhase, Vehicle,
};
pub use updates::{
    MetricsUpdate, RunStatePatch, SimulationSnapshot, TrafficLightDelta, TrafficLightUpdateBatch,
    VehicleDelta, VehicleUpdateBatch,
};
pub use validate::{Validate, ValidationError};
