//! Outbound commands: client-to-server frames of the form
//! `{ "command": <name>, ...params }`.

use serde::{Deserialize, Serialize};

use crate::ids::ScenarioId;

/// A command the backend understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Start (or restart) the simulation with a scenario.
    Start {
        /// Scenario to run.
        scenario_id: ScenarioId,
    },
    /// Pause a running simulation.
    Pause,
    /// Resume a paused simulation.
    Resume,
    /// Stop the simulation.
    Stop,
    /// Stop and clear the simulation.
    Reset,
    /// Inject an emergency vehicle.
    EmergencyVehicle,
    /// Switch to another scenario.
    ChangeScenario {
        /// Scenario to switch to.
        scenario_id: ScenarioId,
    },
    /// Ask the backend to push its current status.
    GetStatus,
    /// Change the playback speed multiplier.
    Speed {
        /// New multiplier.
        speed: f64,
    },
}

impl ClientCommand {
    /// The `command` string used on the wire.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Reset => "reset",
            Self::EmergencyVehicle => "emergency_vehicle",
            Self::ChangeScenario { .. } => "change_scenario",
            Self::GetStatus => "get_status",
            Self::Speed { .. } => "speed",
        }
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
