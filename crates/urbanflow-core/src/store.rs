//! The canonical in-memory mirror of the remote simulation.
//!
//! [`CanonicalStore`] owns the only mutable copy of vehicles, traffic
//! lights, metrics, and run state. Every mutation runs to completion under
//! the channel's write lock before the next one starts, so the state is
//! always the result of some serial ordering of the updates received.
//! Readers get either a borrowed view ([`CanonicalStore::read`]) or a
//! change-notified receiver ([`CanonicalStore::subscribe`]).
//!
//! The revision counter only moves when a mutation changes something, so
//! consumers can use it as a cheap cache key.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use urbanflow_types::{
    Message, MessageKind, RunState, RunStatePatch, Scenario, SimulationMetrics,
    SimulationSnapshot, TrafficLight, TrafficLightDelta, TrafficLightId, Vehicle, VehicleDelta,
    VehicleId,
};

use crate::bus::{EventBus, Subscription};

/// Kinds the store applies when attached to a bus.
pub const STORE_KINDS: [MessageKind; 7] = [
    MessageKind::SimulationUpdate,
    MessageKind::VehicleUpdate,
    MessageKind::TrafficLightUpdate,
    MessageKind::MetricsUpdate,
    MessageKind::SimulationStatus,
    MessageKind::Reset,
    MessageKind::ToggleOptimization,
];

/// The mirrored simulation state.
///
/// `Default` is the exact initial state: no vehicles, no lights, no
/// metrics, run state at defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationState {
    /// Vehicles keyed by id.
    pub vehicles: BTreeMap<VehicleId, Vehicle>,
    /// Traffic lights keyed by id.
    pub traffic_lights: BTreeMap<TrafficLightId, TrafficLight>,
    /// Latest metrics, if any have arrived.
    pub metrics: Option<SimulationMetrics>,
    /// Run lifecycle state.
    pub run: RunState,
}

/// Everything the store holds, as seen by readers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mirror {
    /// Bumped once per state-changing mutation.
    pub revision: u64,
    /// Simulation state.
    pub state: SimulationState,
    /// Scenario catalog. Reference data; survives [`CanonicalStore::reset`].
    pub scenarios: Vec<Scenario>,
}

/// The single authoritative store. Cloning yields another handle to the
/// same state.
#[derive(Debug, Clone)]
pub struct CanonicalStore {
    tx: Arc<watch::Sender<Mirror>>,
}

impl Default for CanonicalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CanonicalStore {
    /// Create a store holding the initial state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Mirror::default());
        Self { tx: Arc::new(tx) }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Run `f` against the current state.
    ///
    /// Holds the read lock for the duration of `f`; keep it short.
    pub fn read<R>(&self, f: impl FnOnce(&SimulationState) -> R) -> R {
        f(&self.tx.borrow().state)
    }

    /// Run `f` against the full mirror, revision and catalog included.
    pub fn read_mirror<R>(&self, f: impl FnOnce(&Mirror) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> SimulationState {
        self.read(Clone::clone)
    }

    /// Current revision.
    pub fn revision(&self) -> u64 {
        self.tx.borrow().revision
    }

    /// A receiver that is notified after every state-changing mutation.
    pub fn subscribe(&self) -> watch::Receiver<Mirror> {
        self.tx.subscribe()
    }

    /// One vehicle by id.
    pub fn vehicle(&self, id: &str) -> Option<Vehicle> {
        self.read(|s| s.vehicles.get(id).cloned())
    }

    /// One traffic light by id.
    pub fn traffic_light(&self, id: &str) -> Option<TrafficLight> {
        self.read(|s| s.traffic_lights.get(id).cloned())
    }

    /// Current run state.
    pub fn run_state(&self) -> RunState {
        self.read(|s| s.run.clone())
    }

    /// The scenario catalog.
    pub fn scenarios(&self) -> Vec<Scenario> {
        self.tx.borrow().scenarios.clone()
    }

    /// The catalog entry for the run state's active scenario, if both are
    /// known.
    pub fn current_scenario(&self) -> Option<Scenario> {
        let mirror = self.tx.borrow();
        let id = mirror.state.run.current_scenario.as_ref()?;
        mirror.scenarios.iter().find(|s| &s.id == id).cloned()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Apply `f` to the state; bump the revision and notify readers only
    /// if it reports a change.
    fn mutate(&self, f: impl FnOnce(&mut SimulationState) -> bool) -> bool {
        self.tx.send_if_modified(|mirror| {
            let changed = f(&mut mirror.state);
            if changed {
                mirror.revision = mirror.revision.wrapping_add(1);
            }
            changed
        })
    }

    /// Replace the whole vehicle collection.
    pub fn replace_vehicles(&self, vehicles: Vec<Vehicle>) -> bool {
        self.mutate(|state| replace_keyed(&mut state.vehicles, vehicles, |v| v.id.clone()))
    }

    /// Apply one partial vehicle update. Unknown ids are a no-op.
    pub fn apply_vehicle_delta(&self, delta: &VehicleDelta) -> bool {
        self.mutate(|state| merge_vehicle(&mut state.vehicles, delta))
    }

    /// Apply a batch of partial vehicle updates as one mutation.
    pub fn apply_vehicle_deltas(&self, deltas: &[VehicleDelta]) -> bool {
        self.mutate(|state| {
            deltas
                .iter()
                .fold(false, |changed, d| merge_vehicle(&mut state.vehicles, d) | changed)
        })
    }

    /// Remove one vehicle.
    pub fn remove_vehicle(&self, id: &str) -> bool {
        self.mutate(|state| state.vehicles.remove(id).is_some())
    }

    /// Replace the whole traffic light collection.
    pub fn replace_traffic_lights(&self, lights: Vec<TrafficLight>) -> bool {
        self.mutate(|state| replace_keyed(&mut state.traffic_lights, lights, |l| l.id.clone()))
    }

    /// Apply one partial traffic light update. Unknown ids are a no-op.
    pub fn apply_traffic_light_delta(&self, delta: &TrafficLightDelta) -> bool {
        self.mutate(|state| merge_light(&mut state.traffic_lights, delta))
    }

    /// Apply a batch of partial traffic light updates as one mutation.
    pub fn apply_traffic_light_deltas(&self, deltas: &[TrafficLightDelta]) -> bool {
        self.mutate(|state| {
            deltas
                .iter()
                .fold(false, |changed, d| merge_light(&mut state.traffic_lights, d) | changed)
        })
    }

    /// Replace the metrics wholesale.
    pub fn replace_metrics(&self, metrics: SimulationMetrics) -> bool {
        self.mutate(|state| {
            if state.metrics.as_ref() == Some(&metrics) {
                return false;
            }
            state.metrics = Some(metrics);
            true
        })
    }

    /// Shallow-merge a run-state patch.
    pub fn patch_run_state(&self, patch: &RunStatePatch) -> bool {
        self.mutate(|state| apply_run_patch(&mut state.run, patch))
    }

    /// Apply the parts of a snapshot that are present, atomically.
    pub fn apply_snapshot(&self, snapshot: SimulationSnapshot) -> bool {
        let SimulationSnapshot {
            vehicles,
            traffic_lights,
            metrics,
            state: run_patch,
            simulation_time,
        } = snapshot;

        self.mutate(|state| {
            let mut changed = false;
            if let Some(vehicles) = vehicles {
                changed |= replace_keyed(&mut state.vehicles, vehicles, |v| v.id.clone());
            }
            if let Some(lights) = traffic_lights {
                changed |= replace_keyed(&mut state.traffic_lights, lights, |l| l.id.clone());
            }
            if let Some(metrics) = metrics {
                if state.metrics.as_ref() != Some(&metrics) {
                    state.metrics = Some(metrics);
                    changed = true;
                }
            }
            let mut patch = run_patch.unwrap_or_default();
            if patch.simulation_time.is_none() {
                patch.simulation_time = simulation_time;
            }
            changed |= apply_run_patch(&mut state.run, &patch);
            changed
        })
    }

    /// Flip the optimization flag, reading and writing it in one step.
    /// Returns the new value.
    pub fn toggle_optimization(&self) -> bool {
        let mut enabled = false;
        self.mutate(|state| {
            state.run.optimization_mode = !state.run.optimization_mode;
            enabled = state.run.optimization_mode;
            true
        });
        enabled
    }

    /// Return the simulation state to its initial values in one step.
    ///
    /// The scenario catalog is kept.
    pub fn reset(&self) -> bool {
        self.mutate(|state| {
            if *state == SimulationState::default() {
                return false;
            }
            *state = SimulationState::default();
            true
        })
    }

    /// Replace the scenario catalog.
    pub fn set_scenarios(&self, scenarios: Vec<Scenario>) -> bool {
        self.tx.send_if_modified(|mirror| {
            if mirror.scenarios == scenarios {
                return false;
            }
            mirror.scenarios = scenarios;
            mirror.revision = mirror.revision.wrapping_add(1);
            true
        })
    }

    /// Apply an inbound message. Kinds the store does not own are ignored.
    pub fn apply_message(&self, message: &Message) -> bool {
        match message {
            Message::SimulationUpdate(snapshot) => self.apply_snapshot(snapshot.as_ref().clone()),
            Message::VehicleUpdate(batch) => self.apply_vehicle_deltas(&batch.updates),
            Message::TrafficLightUpdate(batch) => self.apply_traffic_light_deltas(&batch.updates),
            Message::MetricsUpdate(metrics) => self.replace_metrics(metrics.as_ref().clone()),
            Message::SimulationStatus(patch) => self.patch_run_state(patch),
            Message::Reset => self.reset(),
            Message::ToggleOptimization => {
                self.toggle_optimization();
                true
            }
            Message::Notification(_)
            | Message::EmergencyAlert(_)
            | Message::Error(_)
            | Message::Connect(_)
            | Message::Disconnect(_) => false,
        }
    }

    /// Register the store's handlers on `bus` for every kind in
    /// [`STORE_KINDS`]. Unsubscribing the returned handles detaches it.
    pub fn attach(&self, bus: &EventBus<Message>) -> Vec<Subscription<Message>> {
        STORE_KINDS
            .into_iter()
            .map(|kind| {
                let store = self.clone();
                bus.subscribe(kind, move |message| {
                    let changed = store.apply_message(message);
                    tracing::trace!(kind = %message.kind(), changed, "store applied message");
                    Ok(())
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Merge rules
// ---------------------------------------------------------------------------

fn replace_keyed<K: Ord, V: PartialEq>(
    target: &mut BTreeMap<K, V>,
    items: Vec<V>,
    key: impl Fn(&V) -> K,
) -> bool {
    let next: BTreeMap<K, V> = items.into_iter().map(|item| (key(&item), item)).collect();
    if *target == next {
        return false;
    }
    *target = next;
    true
}

fn merge_vehicle(vehicles: &mut BTreeMap<VehicleId, Vehicle>, delta: &VehicleDelta) -> bool {
    let Some(vehicle) = vehicles.get_mut(delta.id.as_str()) else {
        tracing::trace!(id = %delta.id, "delta for unknown vehicle ignored");
        return false;
    };
    let before = vehicle.clone();
    if let Some(position) = delta.position {
        vehicle.position = position;
    }
    if let Some(speed) = delta.speed {
        vehicle.speed = speed;
    }
    if let Some(angle) = delta.angle {
        vehicle.angle = Some(angle);
    }
    if let Some(lane) = &delta.lane {
        vehicle.lane.clone_from(lane);
    }
    if let Some(route) = &delta.route {
        vehicle.route.clone_from(route);
    }
    if let Some(color) = &delta.color {
        vehicle.color = Some(color.clone());
    }
    *vehicle != before
}

fn merge_light(
    lights: &mut BTreeMap<TrafficLightId, TrafficLight>,
    delta: &TrafficLightDelta,
) -> bool {
    let Some(light) = lights.get_mut(delta.id.as_str()) else {
        tracing::trace!(id = %delta.id, "delta for unknown traffic light ignored");
        return false;
    };
    let before = light.clone();
    if let Some(state) = &delta.state {
        light.state.clone_from(state);
    }
    if let Some(phase) = delta.current_phase {
        if light.accepts_phase(phase) {
            light.current_phase = phase;
        } else {
            tracing::debug!(
                id = %delta.id,
                phase,
                phases = light.phases.len(),
                "phase index out of range, field ignored"
            );
        }
    }
    if let Some(remaining) = delta.remaining_duration {
        light.remaining_duration = Some(remaining);
    }
    *light != before
}

/// Merge `patch` into `run`, then restore the run-state invariants.
///
/// `status` is expanded first so explicit flags in the same patch win.
/// Elapsed time is accepted on a start transition, never decreases while
/// running, and is frozen while stopped.
fn apply_run_patch(run: &mut RunState, patch: &RunStatePatch) -> bool {
    let before = run.clone();
    let was_running = run.is_running;

    if let Some(status) = patch.status {
        let (running, paused) = status.flags();
        run.is_running = running;
        run.is_paused = paused;
    }
    if let Some(running) = patch.is_running {
        run.is_running = running;
    }
    if let Some(paused) = patch.is_paused {
        run.is_paused = paused;
    }
    if !run.is_running {
        run.is_paused = false;
    }
    if let Some(scenario) = &patch.current_scenario {
        run.current_scenario.clone_from(scenario);
    }
    if let Some(time) = patch.simulation_time {
        if run.is_running && was_running {
            run.simulation_time = run.simulation_time.max(time);
        } else if run.is_running {
            run.simulation_time = time;
        }
    }
    if let Some(multiplier) = patch.speed_multiplier {
        if multiplier.is_finite() && multiplier > 0.0 {
            run.speed_multiplier = multiplier;
        }
    }
    if let Some(mode) = patch.optimization_mode {
        run.optimization_mode = mode;
    }
    *run != before
}

#[cfg(test)]
mod tests {
    use urbanflow_types::{Position, RunStatus, ScenarioId, TrafficLightPhase, VehicleType};

    use super::*;

    fn vehicle(id: &str, speed: f64) -> Vehicle {
        Vehicle {
            id: VehicleId::new(id),
            vehicle_type: VehicleType::Passenger,
            position: Position::new(48.85, 2.35),
            speed,
            lane: "lane-0".to_owned(),
            route: vec!["e1".to_owned(), "e2".to_owned()],
            angle: Some(90.0),
            color: None,
        }
    }

    fn light(id: &str, phases: usize) -> TrafficLight {
        TrafficLight {
            id: TrafficLightId::new(id),
            position: Position::new(48.85, 2.35),
            state: "GGrr".to_owned(),
            current_phase: 0,
            phases: (0..phases)
                .map(|_| TrafficLightPhase {
                    duration: 30.0,
                    state: "GGrr".to_owned(),
                    min_duration: None,
                    max_duration: None,
                })
                .collect(),
            remaining_duration: None,
        }
    }

    #[test]
    fn delta_overwrites_only_carried_fields() {
        let store = CanonicalStore::new();
        store.replace_vehicles(vec![vehicle("v1", 10.0)]);

        let mut delta = VehicleDelta::for_vehicle("v1");
        delta.speed = Some(42.0);
        delta.position = Some(Position::new(1.0, 2.0));
        assert!(store.apply_vehicle_delta(&delta));

        let mut expected = vehicle("v1", 42.0);
        expected.position = Position::new(1.0, 2.0);
        assert_eq!(store.vehicle("v1"), Some(expected));
    }

    #[test]
    fn delta_for_unknown_vehicle_changes_nothing() {
        let store = CanonicalStore::new();
        store.replace_vehicles(vec![vehicle("v1", 10.0)]);
        let before = store.snapshot();
        let revision = store.revision();

        let mut delta = VehicleDelta::for_vehicle("ghost");
        delta.speed = Some(99.0);
        assert!(!store.apply_vehicle_delta(&delta));
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.revision(), revision);
        assert!(store.vehicle("ghost").is_none());
    }

    #[test]
    fn replace_drops_absent_and_replaces_present() {
        let store = CanonicalStore::new();
        store.replace_vehicles(vec![vehicle("v1", 10.0), vehicle("v2", 20.0)]);
        let mut replacement = vehicle("v2", 5.0);
        replacement.lane = "lane-9".to_owned();
        store.replace_vehicles(vec![replacement.clone()]);

        assert!(store.vehicle("v1").is_none());
        assert_eq!(store.vehicle("v2"), Some(replacement));
    }

    #[test]
    fn replace_with_empty_collection_clears() {
        let store = CanonicalStore::new();
        store.replace_vehicles(vec![vehicle("v1", 10.0)]);
        store.replace_traffic_lights(vec![light("tl1", 2)]);
        store.replace_vehicles(Vec::new());
        store.replace_traffic_lights(Vec::new());
        assert!(store.read(|s| s.vehicles.is_empty() && s.traffic_lights.is_empty()));
    }

    #[test]
    fn duplicate_ids_in_collection_keep_last() {
        let store = CanonicalStore::new();
        store.replace_vehicles(vec![vehicle("v1", 10.0), vehicle("v1", 30.0)]);
        assert_eq!(store.read(|s| s.vehicles.len()), 1);
        assert_eq!(store.vehicle("v1").map(|v| v.speed), Some(30.0));
    }

    #[test]
    fn out_of_range_phase_is_ignored_other_fields_applied() {
        let store = CanonicalStore::new();
        store.replace_traffic_lights(vec![light("tl1", 2)]);

        let mut delta = TrafficLightDelta::for_light("tl1");
        delta.current_phase = Some(5);
        delta.state = Some("rrGG".to_owned());
        store.apply_traffic_light_delta(&delta);

        let tl = store.traffic_light("tl1");
        assert_eq!(tl.as_ref().map(|l| l.current_phase), Some(0));
        assert_eq!(tl.map(|l| l.state), Some("rrGG".to_owned()));

        delta.current_phase = Some(1);
        store.apply_traffic_light_delta(&delta);
        assert_eq!(store.traffic_light("tl1").map(|l| l.current_phase), Some(1));
    }

    #[test]
    fn metrics_are_replaced_not_merged() {
        let store = CanonicalStore::new();
        let first = sample_metrics(30.0, [("j1", 4)]);
        let second = sample_metrics(12.0, []);
        store.replace_metrics(first);
        store.replace_metrics(second.clone());
        assert_eq!(store.read(|s| s.metrics.clone()), Some(second));
    }

    #[test]
    fn status_expands_and_flags_win() {
        let store = CanonicalStore::new();
        store.patch_run_state(&RunStatePatch::status(RunStatus::Paused));
        let run = store.run_state();
        assert!(run.is_running && run.is_paused);

        let patch = RunStatePatch {
            status: Some(RunStatus::Paused),
            is_paused: Some(false),
            ..RunStatePatch::default()
        };
        store.patch_run_state(&patch);
        assert!(!store.run_state().is_paused);
    }

    #[test]
    fn paused_requires_running() {
        let store = CanonicalStore::new();
        let patch = RunStatePatch {
            is_paused: Some(true),
            ..RunStatePatch::default()
        };
        store.patch_run_state(&patch);
        assert!(!store.run_state().is_paused);
    }

    #[test]
    fn elapsed_time_rules() {
        let store = CanonicalStore::new();
        let at = |status: Option<RunStatus>, time: f64| RunStatePatch {
            status,
            simulation_time: Some(time),
            ..RunStatePatch::default()
        };

        store.patch_run_state(&at(Some(RunStatus::Running), 10.0));
        assert_eq!(store.run_state().simulation_time, 10.0);

        store.patch_run_state(&at(None, 7.0));
        assert_eq!(store.run_state().simulation_time, 10.0);

        store.patch_run_state(&at(None, 12.5));
        assert_eq!(store.run_state().simulation_time, 12.5);

        store.patch_run_state(&at(Some(RunStatus::Stopped), 50.0));
        assert_eq!(store.run_state().simulation_time, 12.5);

        store.patch_run_state(&at(None, 60.0));
        assert_eq!(store.run_state().simulation_time, 12.5);

        store.patch_run_state(&at(Some(RunStatus::Running), 0.0));
        assert_eq!(store.run_state().simulation_time, 0.0);
    }

    #[test]
    fn unspecified_run_fields_are_retained() {
        let store = CanonicalStore::new();
        let patch = RunStatePatch {
            status: Some(RunStatus::Running),
            current_scenario: Some(Some(ScenarioId::new("rush_hour"))),
            ..RunStatePatch::default()
        };
        store.patch_run_state(&patch);
        store.patch_run_state(&RunStatePatch::speed_multiplier(2.0));
        store.patch_run_state(&RunStatePatch::speed_multiplier(-1.0));

        let run = store.run_state();
        assert!(run.is_running);
        assert_eq!(run.current_scenario, Some(ScenarioId::new("rush_hour")));
        assert_eq!(run.speed_multiplier, 2.0);

        let clear = RunStatePatch {
            current_scenario: Some(None),
            ..RunStatePatch::default()
        };
        store.patch_run_state(&clear);
        assert_eq!(store.run_state().current_scenario, None);
    }

    #[test]
    fn snapshot_applies_only_present_parts() {
        let store = CanonicalStore::new();
        store.replace_traffic_lights(vec![light("tl1", 1)]);
        let snapshot = SimulationSnapshot {
            vehicles: Some(vec![vehicle("v1", 10.0)]),
            state: Some(RunStatePatch::status(RunStatus::Running)),
            simulation_time: Some(4.0),
            ..SimulationSnapshot::default()
        };
        let revision = store.revision();
        assert!(store.apply_snapshot(snapshot));
        assert_eq!(store.revision(), revision + 1);

        store.read(|s| {
            assert_eq!(s.vehicles.len(), 1);
            assert_eq!(s.traffic_lights.len(), 1);
            assert!(s.metrics.is_none());
            assert!(s.run.is_running);
            assert_eq!(s.run.simulation_time, 4.0);
        });
    }

    #[test]
    fn reset_restores_initial_state_and_keeps_catalog() {
        let store = CanonicalStore::new();
        store.set_scenarios(vec![scenario("default")]);
        store.replace_vehicles(vec![vehicle("v1", 10.0)]);
        store.replace_traffic_lights(vec![light("tl1", 2)]);
        store.replace_metrics(sample_metrics(20.0, []));
        store.patch_run_state(&RunStatePatch::status(RunStatus::Running));

        assert!(store.reset());
        assert_eq!(store.snapshot(), SimulationState::default());
        assert_eq!(store.scenarios().len(), 1);
        assert!(!store.reset());
    }

    #[test]
    fn current_scenario_resolves_from_catalog() {
        let store = CanonicalStore::new();
        store.set_scenarios(vec![scenario("default"), scenario("rush_hour")]);
        assert!(store.current_scenario().is_none());
        let patch = RunStatePatch {
            current_scenario: Some(Some(ScenarioId::new("rush_hour"))),
            ..RunStatePatch::default()
        };
        store.patch_run_state(&patch);
        assert_eq!(
            store.current_scenario().map(|s| s.id),
            Some(ScenarioId::new("rush_hour"))
        );
    }

    #[test]
    fn revision_moves_only_on_change() {
        let store = CanonicalStore::new();
        let v = vec![vehicle("v1", 10.0)];
        assert!(store.replace_vehicles(v.clone()));
        let revision = store.revision();
        assert!(!store.replace_vehicles(v));
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn attached_store_applies_bus_messages() {
        let bus = EventBus::<Message>::new();
        let store = CanonicalStore::new();
        let subs = store.attach(&bus);
        assert_eq!(subs.len(), STORE_KINDS.len());

        let snapshot = SimulationSnapshot {
            vehicles: Some(vec![vehicle("v1", 10.0)]),
            ..SimulationSnapshot::default()
        };
        bus.publish(&Message::SimulationUpdate(Box::new(snapshot)));
        assert!(store.vehicle("v1").is_some());

        bus.publish(&Message::Reset);
        assert!(store.vehicle("v1").is_none());

        bus.publish(&Message::ToggleOptimization);
        bus.publish(&Message::ToggleOptimization);
        bus.publish(&Message::ToggleOptimization);
        assert!(store.run_state().optimization_mode);

        for sub in &subs {
            sub.unsubscribe();
        }
        let snapshot = SimulationSnapshot {
            vehicles: Some(vec![vehicle("v2", 10.0)]),
            ..SimulationSnapshot::default()
        };
        bus.publish(&Message::SimulationUpdate(Box::new(snapshot)));
        assert!(store.vehicle("v2").is_none());
    }

    #[test]
    fn toggles_compose_against_current_value() {
        let store = CanonicalStore::new();
        assert!(store.toggle_optimization());
        assert!(!store.toggle_optimization());
        assert_eq!(store.revision(), 2);
        assert!(!store.run_state().optimization_mode);

        store.toggle_optimization();
        assert!(store.reset());
        assert!(!store.run_state().optimization_mode);
    }

    #[tokio::test]
    async fn subscribers_are_notified_of_changes() {
        let store = CanonicalStore::new();
        let mut rx = store.subscribe();
        store.replace_vehicles(vec![vehicle("v1", 10.0)]);
        assert!(rx.changed().await.is_ok());
        assert_eq!(rx.borrow_and_update().state.vehicles.len(), 1);
    }

    fn scenario(id: &str) -> Scenario {
        Scenario {
            id: ScenarioId::new(id),
            name: id.to_owned(),
            description: String::new(),
            vehicle_count: 100,
            traffic_density: urbanflow_types::TrafficDensity::Medium,
            has_emergency_vehicles: false,
            duration: 3600,
            is_active: false,
        }
    }

    fn sample_metrics<const N: usize>(avg_speed: f64, queues: [(&str, u32); N]) -> SimulationMetrics {
        SimulationMetrics {
            timestamp: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            total_vehicles: 10,
            avg_speed,
            avg_travel_time: 200.0,
            co2_emissions: 80.0,
            queue_lengths: queues
                .into_iter()
                .map(|(id, n)| (id.to_owned(), n))
                .collect(),
            emergency_vehicles_active: 0,
            completed_trips: 3,
            waiting_time: 12.0,
        }
    }
}
