//! Core entity structs mirrored from the simulation backend.
//!
//! Field names follow the dashboard's camelCase wire shape. The backend
//! also emits some snake_case spellings (`current_phase`,
//! `simulation_time`, ...); those are accepted as aliases on input and
//! never produced on output.
//!
//! Aliases and custom deserializers only widen what is accepted on input.
//! The `TypeScript` bindings describe the serialized shape, so they ignore
//! both; optional fields carry `#[ts(optional)]` explicitly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{TrafficDensity, VehicleType};
use crate::ids::{ScenarioId, TrafficLightId, VehicleId};

// ---------------------------------------------------------------------------
// Geography
// ---------------------------------------------------------------------------

/// A WGS84 latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
}

impl Position {
    /// Create a position from latitude and longitude.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

// ---------------------------------------------------------------------------
// Vehicles
// ---------------------------------------------------------------------------

/// A vehicle moving through the simulated network.
///
/// Created on first appearance in a snapshot, mutated in place by
/// partial updates, removed by explicit removal or by a collection
/// replacement that omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Vehicle {
    /// Stable identifier.
    pub id: VehicleId,
    /// Vehicle class.
    #[serde(rename = "type")]
    pub vehicle_type: VehicleType,
    /// Current position.
    pub position: Position,
    /// Current speed (km/h), never negative.
    pub speed: f64,
    /// Lane the vehicle currently occupies.
    #[serde(default)]
    pub lane: String,
    /// Ordered road segment identifiers the vehicle will traverse.
    #[serde(default)]
    pub route: Vec<String>,
    /// Heading in degrees, when the backend reports one.
    #[serde(default, alias = "heading", skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub angle: Option<f64>,
    /// Display color override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub color: Option<String>,
}

// ---------------------------------------------------------------------------
// Traffic lights
// ---------------------------------------------------------------------------

/// One step of a traffic light's signal program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct TrafficLightPhase {
    /// Phase duration in seconds.
    pub duration: f64,
    /// Per-approach signal string (e.g. `GGrr`).
    pub state: String,
    /// Lower bound for actuated phases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub min_duration: Option<f64>,
    /// Upper bound for actuated phases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub max_duration: Option<f64>,
}

/// A signalized junction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct TrafficLight {
    /// Stable identifier.
    pub id: TrafficLightId,
    /// Junction position.
    pub position: Position,
    /// Current per-approach signal string.
    pub state: String,
    /// Index into [`TrafficLight::phases`] of the active phase.
    #[serde(alias = "current_phase")]
    pub current_phase: usize,
    /// Ordered phase program. Empty when the backend does not publish it.
    #[serde(default)]
    pub phases: Vec<TrafficLightPhase>,
    /// Seconds until the next phase change.
    #[serde(
        default,
        alias = "remaining_duration",
        skip_serializing_if = "Option::is_none"
    )]
    #[ts(optional)]
    pub remaining_duration: Option<f64>,
}

impl TrafficLight {
    /// Whether `index` is a valid phase index for this light.
    ///
    /// A light without a published phase program accepts any index, since
    /// the mirror has nothing to check it against.
    pub fn accepts_phase(&self, index: usize) -> bool {
        self.phases.is_empty() || index < self.phases.len()
    }

    /// The currently active phase definition, if the program is known.
    pub fn active_phase(&self) -> Option<&TrafficLightPhase> {
        self.phases.get(self.current_phase)
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Aggregate network metrics at one instant.
///
/// Immutable once received: each new metrics message replaces the
/// previous one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct SimulationMetrics {
    /// When the backend computed these metrics.
    #[serde(deserialize_with = "flexible_time::deserialize")]
    pub timestamp: DateTime<Utc>,
    /// Vehicles currently in the network.
    #[serde(alias = "total_vehicles")]
    pub total_vehicles: u32,
    /// Average speed (km/h).
    #[serde(alias = "avg_speed")]
    pub avg_speed: f64,
    /// Average travel time (seconds).
    #[serde(alias = "avg_travel_time")]
    pub avg_travel_time: f64,
    /// CO2 emission rate (kg/h).
    #[serde(alias = "co2_emissions")]
    pub co2_emissions: f64,
    /// Queue length per junction id.
    #[serde(default, alias = "queue_lengths")]
    pub queue_lengths: BTreeMap<String, u32>,
    /// Emergency vehicles currently active.
    #[serde(default, alias = "emergency_vehicles_active")]
    pub emergency_vehicles_active: u32,
    /// Trips completed since the run started.
    #[serde(default, alias = "completed_trips")]
    pub completed_trips: u32,
    /// Average waiting time (seconds).
    #[serde(default, alias = "waiting_time")]
    pub waiting_time: f64,
}

/// The backend stamps metrics three ways depending on the code path:
/// RFC 3339, naive ISO-8601 without an offset (UTC implied), or epoch
/// numbers in seconds or milliseconds.
mod flexible_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    /// Epoch values above this are taken to be milliseconds.
    const MILLIS_THRESHOLD: f64 = 1e11;
    /// Roughly year 33658; anything later is garbage.
    const MAX_MILLIS: f64 = 1e15;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Text(text) => parse_text(&text)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp `{text}`"))),
            Raw::Number(n) => from_epoch(n)
                .ok_or_else(|| D::Error::custom(format!("timestamp {n} out of range"))),
        }
    }

    fn parse_text(text: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(text)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    fn from_epoch(n: f64) -> Option<DateTime<Utc>> {
        let millis = if n > MILLIS_THRESHOLD { n } else { n * 1000.0 };
        if !millis.is_finite() || !(0.0..=MAX_MILLIS).contains(&millis) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let millis = millis.round() as i64;
        DateTime::from_timestamp_millis(millis)
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Lifecycle state of the remote simulation run.
///
/// Invariants kept by the store: `is_paused` implies `is_running`; while
/// stopped, `simulation_time` is frozen; `speed_multiplier` is positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct RunState {
    /// Whether the simulation is running.
    pub is_running: bool,
    /// Whether the running simulation is paused.
    pub is_paused: bool,
    /// Active scenario, if any.
    pub current_scenario: Option<ScenarioId>,
    /// Elapsed simulation time (seconds).
    pub simulation_time: f64,
    /// Playback speed multiplier.
    pub speed_multiplier: f64,
    /// Whether signal optimization is enabled.
    pub optimization_mode: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            is_running: false,
            is_paused: false,
            current_scenario: None,
            simulation_time: 0.0,
            speed_multiplier: 1.0,
            optimization_mode: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Static scenario descriptor served by the REST collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Scenario {
    /// Scenario identifier.
    pub id: ScenarioId,
    /// Human-readable name.
    pub name: String,
    /// Longer description. The backend sends `null` when unset.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    /// Number of vehicles the scenario spawns.
    #[serde(alias = "vehicle_count")]
    pub vehicle_count: u32,
    /// Density class.
    #[serde(default, alias = "traffic_density")]
    pub traffic_density: TrafficDensity,
    /// Whether emergency vehicles are part of the scenario.
    #[serde(default, alias = "has_emergency_vehicles")]
    pub has_emergency_vehicles: bool,
    /// Scenario duration in seconds.
    pub duration: u32,
    /// Whether the backend currently has this scenario activated.
    #[serde(default, alias = "is_active")]
    pub is_active: bool,
}

fn null_as_empty<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn vehicle_accepts_heading_alias() {
        let value = json!({
            "id": "v1",
            "type": "bus",
            "position": {"lat": 48.85, "lng": 2.35},
            "speed": 30.0,
            "lane": "edge_1_0",
            "route": ["edge_1", "edge_2"],
            "heading": 90.0,
            "color": "#10b981"
        });
        let vehicle: Vehicle = serde_json::from_value(value).unwrap_or_else(|e| {
            panic!("vehicle should decode: {e}");
        });
        assert_eq!(vehicle.vehicle_type, VehicleType::Bus);
        assert_eq!(vehicle.angle, Some(90.0));
        assert_eq!(vehicle.route.len(), 2);
    }

    #[test]
    fn vehicle_optional_fields_default() {
        let value = json!({
            "id": "v2",
            "type": "passenger",
            "position": {"lat": 0.0, "lng": 0.0},
            "speed": 0.0
        });
        let vehicle: Result<Vehicle, _> = serde_json::from_value(value);
        let vehicle = vehicle.ok();
        assert!(vehicle.as_ref().is_some_and(|v| v.lane.is_empty()));
        assert!(vehicle.as_ref().is_some_and(|v| v.angle.is_none()));
    }

    #[test]
    fn traffic_light_phase_bounds() {
        let light = TrafficLight {
            id: TrafficLightId::new("tl_1"),
            position: Position::new(0.0, 0.0),
            state: "GGrr".to_owned(),
            current_phase: 0,
            phases: vec![
                TrafficLightPhase {
                    duration: 30.0,
                    state: "GGrr".to_owned(),
                    min_duration: None,
                    max_duration: None,
                },
                TrafficLightPhase {
                    duration: 5.0,
                    state: "yyrr".to_owned(),
                    min_duration: None,
                    max_duration: None,
                },
            ],
            remaining_duration: None,
        };
        assert!(light.accepts_phase(1));
        assert!(!light.accepts_phase(2));
        assert_eq!(light.active_phase().map(|p| p.state.as_str()), Some("GGrr"));
    }

    #[test]
    fn light_without_program_accepts_any_phase() {
        let light = TrafficLight {
            id: TrafficLightId::new("tl_2"),
            position: Position::new(0.0, 0.0),
            state: "rrGG".to_owned(),
            current_phase: 3,
            phases: Vec::new(),
            remaining_duration: Some(4.0),
        };
        assert!(light.accepts_phase(17));
        assert!(light.active_phase().is_none());
    }

    #[test]
    fn metrics_timestamps_in_backend_shapes() {
        let base = json!({
            "totalVehicles": 1, "avgSpeed": 1.0, "avgTravelTime": 1.0, "co2Emissions": 1.0
        });
        let with = |ts: serde_json::Value| {
            let mut value = base.clone();
            value["timestamp"] = ts;
            serde_json::from_value::<SimulationMetrics>(value)
                .ok()
                .map(|m| m.timestamp.timestamp())
        };
        assert_eq!(with(json!("2024-01-25T14:30:00Z")), Some(1_706_193_000));
        assert_eq!(with(json!("2024-01-25T14:30:00.250")), Some(1_706_193_000));
        assert_eq!(with(json!(1_706_193_000.5)), Some(1_706_193_000));
        assert_eq!(with(json!(1_706_193_000_000_u64)), Some(1_706_193_000));
        assert_eq!(with(json!("yesterday")), None);
    }

    #[test]
    fn run_state_default_values() {
        let state = RunState::default();
        assert!(!state.is_running);
        assert!(!state.is_paused);
        assert!(state.current_scenario.is_none());
        assert!(state.speed_multiplier > 0.0);
    }

    #[test]
    fn scenario_accepts_backend_model_shape() {
        let value = json!({
            "id": "rush_hour",
            "name": "Heure de Pointe",
            "description": "Pic de trafic du matin",
            "vehicleCount": 250,
            "trafficDensity": "very-high",
            "hasEmergencyVehicles": true,
            "duration": 7200,
            "isActive": false
        });
        let scenario: Result<Scenario, _> = serde_json::from_value(value);
        let scenario = scenario.ok();
        assert_eq!(
            scenario.as_ref().map(|s| s.traffic_density),
            Some(TrafficDensity::VeryHigh)
        );
        assert_eq!(scenario.map(|s| s.vehicle_count), Some(250));
    }

    #[test]
    fn scenario_with_null_description_and_timestamps() {
        let value = json!({
            "id": "custom",
            "name": "Custom",
            "description": null,
            "vehicleCount": 10,
            "trafficDensity": "low",
            "hasEmergencyVehicles": false,
            "duration": 600,
            "isActive": true,
            "createdAt": "2024-01-25T14:30:00",
            "updatedAt": null
        });
        let scenario: Result<Scenario, _> = serde_json::from_value(value);
        assert_eq!(scenario.ok().map(|s| s.description), Some(String::new()));
    }
}
