//! Integration tests driving the store through decoded wire frames.
//!
//! Frames are decoded with `urbanflow_types::decode_frame`, published on
//! an `EventBus`, and applied by an attached `CanonicalStore`, exactly as
//! the client pipeline does minus the network.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use serde_json::json;
use urbanflow_core::{CanonicalStore, DerivedViews, EventBus, SimulationState};
use urbanflow_types::{Message, MessageKind, PerformanceTier, Position, decode_frame};

fn publish(bus: &EventBus<Message>, frame: &serde_json::Value) {
    let envelope = decode_frame(&frame.to_string()).unwrap();
    bus.publish(&envelope.message);
}

fn snapshot_frame() -> serde_json::Value {
    json!({
        "type": "simulation_update",
        "timestamp": 1_706_193_000_000_u64,
        "data": {
            "vehicles": [
                {"id": "v1", "type": "passenger", "position": {"lat": 48.85, "lng": 2.35},
                 "speed": 10, "lane": "lane-0", "route": ["e1", "e2"], "angle": 45},
                {"id": "v2", "type": "bus", "position": {"lat": 48.86, "lng": 2.36},
                 "speed": 22, "lane": "lane-1", "route": ["e3"]}
            ],
            "trafficLights": [
                {"id": "tl1", "position": {"lat": 48.85, "lng": 2.35}, "state": "GGrr",
                 "currentPhase": 0,
                 "phases": [{"duration": 30, "state": "GGrr"}, {"duration": 5, "state": "yyrr"}]}
            ],
            "metrics": {
                "timestamp": "2024-01-25T14:30:00Z",
                "totalVehicles": 2, "avgSpeed": 45.0, "avgTravelTime": 100.0,
                "co2Emissions": 12.0, "queueLengths": {"j1": 3}
            },
            "state": {"isRunning": true, "isPaused": false, "currentScenario": "default"},
            "simulationTime": 12.0
        }
    })
}

fn wired() -> (EventBus<Message>, CanonicalStore) {
    let bus = EventBus::new();
    let store = CanonicalStore::new();
    let _subs = store.attach(&bus);
    (bus, store)
}

#[test]
fn vehicle_update_merges_into_existing_vehicle() {
    let (bus, store) = wired();
    publish(&bus, &snapshot_frame());

    publish(
        &bus,
        &json!({
            "type": "vehicle_update",
            "data": {"updates": [{"id": "v1", "speed": 42, "position": {"lat": 1, "lng": 2}}]}
        }),
    );

    let v1 = store.vehicle("v1").unwrap();
    assert!((v1.speed - 42.0).abs() < f64::EPSILON);
    assert_eq!(v1.position, Position::new(1.0, 2.0));
    assert_eq!(v1.lane, "lane-0");
    assert_eq!(v1.route, vec!["e1".to_owned(), "e2".to_owned()]);
    assert_eq!(v1.angle, Some(45.0));
}

#[test]
fn sequential_deltas_touch_only_their_fields() {
    let (bus, store) = wired();
    publish(&bus, &snapshot_frame());
    let original = store.vehicle("v2").unwrap();

    for (i, speed) in [5.0, 7.5, 3.25].into_iter().enumerate() {
        publish(
            &bus,
            &json!({"type": "vehicle_update", "data": {"updates": [{"id": "v2", "speed": speed}]}}),
        );
        let current = store.vehicle("v2").unwrap();
        let mut expected = original.clone();
        expected.speed = speed;
        assert_eq!(current, expected, "after delta {i}");
    }

    publish(
        &bus,
        &json!({"type": "vehicle_update", "data": {"updates": [{"id": "v2", "lane": "lane-7"}]}}),
    );
    let current = store.vehicle("v2").unwrap();
    assert_eq!(current.lane, "lane-7");
    assert!((current.speed - 3.25).abs() < f64::EPSILON);
    assert_eq!(current.position, original.position);
}

#[test]
fn deltas_for_unknown_ids_are_no_ops() {
    let (bus, store) = wired();
    publish(&bus, &snapshot_frame());
    let before = store.snapshot();

    publish(
        &bus,
        &json!({"type": "vehicle_update", "data": {"updates": [{"id": "v404", "speed": 1}]}}),
    );
    publish(
        &bus,
        &json!({"type": "traffic_light_update", "data": {"updates": [{"id": "tl404", "state": "rrrr"}]}}),
    );
    assert_eq!(store.snapshot(), before);
}

#[test]
fn status_then_reset_returns_to_initial_state() {
    let (bus, store) = wired();
    publish(&bus, &snapshot_frame());
    publish(
        &bus,
        &json!({"type": "simulation_status", "data": {"status": "paused", "message": "Simulation paused"}}),
    );
    let run = store.run_state();
    assert!(run.is_running && run.is_paused);

    bus.publish(&Message::Reset);
    assert_eq!(store.snapshot(), SimulationState::default());
}

#[test]
fn views_follow_the_store() {
    let (bus, store) = wired();
    let views = DerivedViews::new(store);
    assert_eq!(views.performance(), PerformanceTier::Unknown);

    publish(&bus, &snapshot_frame());
    let view = views.dashboard();
    assert_eq!(view.performance, PerformanceTier::Excellent);
    assert_eq!(view.metrics.avg_speed, "45.0 km/h");
    assert_eq!(view.vehicles.total(), 2);
    assert_eq!(view.traffic_lights, 1);
    assert_eq!(view.queues.busiest, Some(("j1".to_owned(), 3)));
}

#[test]
fn independent_instances_do_not_share_state() {
    let (bus_a, store_a) = wired();
    let (_bus_b, store_b) = wired();
    publish(&bus_a, &snapshot_frame());
    assert_eq!(store_a.read(|s| s.vehicles.len()), 2);
    assert_eq!(store_b.read(|s| s.vehicles.len()), 0);
}

#[test]
fn other_subscribers_see_messages_after_the_store() {
    let (bus, store) = wired();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let reader = store.clone();
    let _sub = bus.subscribe(MessageKind::VehicleUpdate, move |_| {
        let speed = reader.vehicle("v1").map(|v| v.speed);
        sink.lock().unwrap().push(speed);
        Ok(())
    });

    publish(&bus, &snapshot_frame());
    publish(
        &bus,
        &json!({"type": "vehicle_update", "data": {"updates": [{"id": "v1", "speed": 99}]}}),
    );
    assert_eq!(*seen.lock().unwrap(), vec![Some(99.0)]);
}
