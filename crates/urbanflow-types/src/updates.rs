//! Incremental update payloads: partial entity deltas, run-state patches,
//! and the full snapshot carried by `simulation_update`.
//!
//! Every optional field here means "not carried by this update". The
//! store overwrites only the fields that are `Some`.

use serde::{Deserialize, Deserializer, Serialize};

use crate::enums::RunStatus;
use crate::ids::{ScenarioId, TrafficLightId, VehicleId};
use crate::structs::{Position, SimulationMetrics, TrafficLight, Vehicle};

/// Deserialize a present field (including an explicit `null`) as `Some`.
///
/// Paired with `#[serde(default)]` this distinguishes an absent field
/// (`None`) from an explicit `null` (`Some(None)`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Partial update for a single vehicle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleDelta {
    /// Vehicle to update. Unknown ids make the delta a no-op.
    pub id: VehicleId,
    /// New position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// New speed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// New heading.
    #[serde(default, alias = "heading", skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    /// New lane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane: Option<String>,
    /// New remaining route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Vec<String>>,
    /// New display color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Backend timestamp of the observation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl VehicleDelta {
    /// A delta for `id` that carries no fields.
    pub fn for_vehicle(id: impl Into<VehicleId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Partial update for a single traffic light.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficLightDelta {
    /// Light to update. Unknown ids make the delta a no-op.
    pub id: TrafficLightId,
    /// New per-approach signal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// New active phase index.
    #[serde(default, alias = "current_phase", skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<usize>,
    /// New countdown to the next phase.
    #[serde(
        default,
        alias = "remaining_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub remaining_duration: Option<f64>,
    /// Backend timestamp of the observation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl TrafficLightDelta {
    /// A delta for `id` that carries no fields.
    pub fn for_light(id: impl Into<TrafficLightId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Field-level patch over the run state.
///
/// `status` is the backend's coarse lifecycle word; when present it is
/// expanded into the running/paused flags before the explicit flags are
/// applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatePatch {
    /// Coarse lifecycle status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    /// Explicit running flag.
    #[serde(default, alias = "is_running", skip_serializing_if = "Option::is_none")]
    pub is_running: Option<bool>,
    /// Explicit paused flag.
    #[serde(default, alias = "is_paused", skip_serializing_if = "Option::is_none")]
    pub is_paused: Option<bool>,
    /// Active scenario; `Some(None)` clears it.
    #[serde(
        default,
        alias = "current_scenario",
        alias = "scenario",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_scenario: Option<Option<ScenarioId>>,
    /// Elapsed simulation time.
    #[serde(
        default,
        alias = "simulation_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub simulation_time: Option<f64>,
    /// Playback speed multiplier.
    #[serde(
        default,
        alias = "speed_multiplier",
        alias = "speed",
        skip_serializing_if = "Option::is_none"
    )]
    pub speed_multiplier: Option<f64>,
    /// Signal optimization flag.
    #[serde(
        default,
        alias = "optimization_mode",
        skip_serializing_if = "Option::is_none"
    )]
    pub optimization_mode: Option<bool>,
    /// Human-readable message accompanying the status change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RunStatePatch {
    /// A patch that only sets the speed multiplier.
    pub fn speed_multiplier(multiplier: f64) -> Self {
        Self {
            speed_multiplier: Some(multiplier),
            ..Self::default()
        }
    }

    /// A patch that only sets the optimization flag.
    pub fn optimization_mode(enabled: bool) -> Self {
        Self {
            optimization_mode: Some(enabled),
            ..Self::default()
        }
    }

    /// A patch carrying only a coarse status.
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Whether this patch carries no state fields (a message alone does
    /// not count).
    pub const fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.is_running.is_none()
            && self.is_paused.is_none()
            && self.current_scenario.is_none()
            && self.simulation_time.is_none()
            && self.speed_multiplier.is_none()
            && self.optimization_mode.is_none()
    }
}

/// Full snapshot carried by `simulation_update`.
///
/// Only the parts that are present are applied; a present collection
/// replaces the mirrored collection wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSnapshot {
    /// Complete vehicle collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicles: Option<Vec<Vehicle>>,
    /// Complete traffic light collection.
    #[serde(
        default,
        alias = "traffic_lights",
        skip_serializing_if = "Option::is_none"
    )]
    pub traffic_lights: Option<Vec<TrafficLight>>,
    /// Latest metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SimulationMetrics>,
    /// Run-state patch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RunStatePatch>,
    /// Elapsed simulation time, when sent outside `state`.
    #[serde(
        default,
        alias = "simulation_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub simulation_time: Option<f64>,
}

/// Payload of `vehicle_update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleUpdateBatch {
    /// Deltas in the order the backend produced them.
    pub updates: Vec<VehicleDelta>,
}

/// Payload of `traffic_light_update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficLightUpdateBatch {
    /// Deltas in the order the backend produced them.
    pub updates: Vec<TrafficLightDelta>,
}

/// Payload of `metrics_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsUpdate {
    /// Replacement metrics.
    pub metrics: SimulationMetrics,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn vehicle_delta_only_carries_present_fields() {
        let delta: Result<VehicleDelta, _> =
            serde_json::from_value(json!({"id": "v1", "speed": 42.0}));
        let delta = delta.unwrap_or_default();
        assert_eq!(delta.id, VehicleId::new("v1"));
        assert_eq!(delta.speed, Some(42.0));
        assert!(delta.position.is_none());
        assert!(delta.angle.is_none());
        assert!(delta.lane.is_none());
    }

    #[test]
    fn scenario_absent_vs_null() {
        let absent: RunStatePatch =
            serde_json::from_value(json!({"isRunning": true})).unwrap_or_default();
        assert_eq!(absent.current_scenario, None);

        let cleared: RunStatePatch =
            serde_json::from_value(json!({"currentScenario": null})).unwrap_or_default();
        assert_eq!(cleared.current_scenario, Some(None));

        let set: RunStatePatch =
            serde_json::from_value(json!({"scenario": "weekend"})).unwrap_or_default();
        assert_eq!(set.current_scenario, Some(Some(ScenarioId::new("weekend"))));
    }

    #[test]
    fn backend_status_shape_decodes() {
        let patch: RunStatePatch = serde_json::from_value(json!({
            "status": "running",
            "is_paused": false,
            "current_scenario": "default",
            "simulation_time": 12.5,
            "message": "Simulation started"
        }))
        .unwrap_or_default();
        assert_eq!(patch.status, Some(RunStatus::Running));
        assert_eq!(patch.is_paused, Some(false));
        assert_eq!(patch.simulation_time, Some(12.5));
        assert!(!patch.is_empty());
    }

    #[test]
    fn message_only_patch_is_empty() {
        let patch = RunStatePatch {
            message: Some("hello".to_owned()),
            ..RunStatePatch::default()
        };
        assert!(patch.is_empty());
    }

    #[test]
    fn snapshot_accepts_snake_case_collections() {
        let snapshot: SimulationSnapshot = serde_json::from_value(json!({
            "traffic_lights": [],
            "simulation_time": 3.0
        }))
        .unwrap_or_default();
        assert_eq!(snapshot.traffic_lights, Some(Vec::new()));
        assert!(snapshot.vehicles.is_none());
        assert_eq!(snapshot.simulation_time, Some(3.0));
    }
}
