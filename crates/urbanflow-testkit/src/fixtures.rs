//! Entity builders and wire-shaped JSON payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use urbanflow_types::{
    Position, Scenario, SimulationMetrics, TrafficDensity, TrafficLight, TrafficLightPhase,
    Vehicle, VehicleType,
};

/// A passenger car at a fixed position.
pub fn vehicle(id: &str, speed: f64) -> Vehicle {
    Vehicle {
        id: id.into(),
        vehicle_type: VehicleType::Passenger,
        position: Position::new(48.8566, 2.3522),
        speed,
        lane: "lane-0".to_owned(),
        route: vec!["edge_1".to_owned(), "edge_2".to_owned()],
        angle: None,
        color: None,
    }
}

/// A vehicle of the given class.
pub fn vehicle_of(id: &str, vehicle_type: VehicleType) -> Vehicle {
    Vehicle {
        vehicle_type,
        ..vehicle(id, 30.0)
    }
}

/// A traffic light with a `phases`-step program, on phase 0.
pub fn traffic_light(id: &str, phases: usize) -> TrafficLight {
    let program = ["GGrr", "yyrr", "rrGG", "rryy"];
    TrafficLight {
        id: id.into(),
        position: Position::new(48.857, 2.353),
        state: "GGrr".to_owned(),
        current_phase: 0,
        phases: program
            .iter()
            .cycle()
            .take(phases)
            .map(|state| TrafficLightPhase {
                duration: 30.0,
                state: (*state).to_owned(),
                min_duration: None,
                max_duration: None,
            })
            .collect(),
        remaining_duration: Some(30.0),
    }
}

/// Metrics with the given average speed and travel time; everything else
/// at plausible values.
pub fn metrics(avg_speed: f64, avg_travel_time: f64) -> SimulationMetrics {
    SimulationMetrics {
        timestamp: DateTime::<Utc>::UNIX_EPOCH,
        total_vehicles: 120,
        avg_speed,
        avg_travel_time,
        co2_emissions: 245.5,
        queue_lengths: BTreeMap::from([("J1".to_owned(), 4), ("J2".to_owned(), 9)]),
        emergency_vehicles_active: 1,
        completed_trips: 37,
        waiting_time: 12.0,
    }
}

/// A catalog entry.
pub fn scenario(id: &str) -> Scenario {
    Scenario {
        id: id.into(),
        name: format!("Scenario {id}"),
        description: String::new(),
        vehicle_count: 100,
        traffic_density: TrafficDensity::Medium,
        has_emergency_vehicles: false,
        duration: 3600,
        is_active: false,
    }
}

/// A wire envelope `{type, data, timestamp}`.
pub fn envelope(kind: &str, data: Value) -> Value {
    json!({"type": kind, "data": data, "timestamp": 1_700_000_000_000_i64})
}

/// A `simulation_update` payload as the backend sends it (snake_case keys).
pub fn snapshot_payload(vehicles: &[Vehicle], lights: &[TrafficLight]) -> Value {
    json!({
        "vehicles": vehicles,
        "traffic_lights": lights,
        "metrics": metrics(35.0, 150.0),
        "simulation_time": 12.5,
    })
}

/// A `vehicle_update` payload moving one vehicle.
pub fn vehicle_move(id: &str, speed: f64, lat: f64, lng: f64) -> Value {
    json!({"updates": [{"id": id, "speed": speed, "position": {"lat": lat, "lng": lng}}]})
}
