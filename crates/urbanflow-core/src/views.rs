//! Read-only projections of the store for presentation code.
//!
//! The free functions are pure: same state in, same view out.
//! [`DerivedViews`] adds one memo slot keyed by store revision, so a cached
//! view can never outlive the mutation that invalidates it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use urbanflow_types::{
    PerformanceTier, RunState, SimulationMetrics, Vehicle, VehicleId, VehicleType,
};

use crate::store::{CanonicalStore, SimulationState};

/// Classify network performance from average speed (km/h) and average
/// travel time (seconds).
///
/// | Tier | Speed | Travel time |
/// |------|-------|-------------|
/// | Excellent | > 40 | < 180 |
/// | Good | > 25 | < 300 |
/// | Moderate | > 15 | < 420 |
/// | Poor | otherwise | |
pub fn classify_performance(metrics: Option<&SimulationMetrics>) -> PerformanceTier {
    let Some(m) = metrics else {
        return PerformanceTier::Unknown;
    };
    let (speed, travel) = (m.avg_speed, m.avg_travel_time);
    if speed > 40.0 && travel < 180.0 {
        PerformanceTier::Excellent
    } else if speed > 25.0 && travel < 300.0 {
        PerformanceTier::Good
    } else if speed > 15.0 && travel < 420.0 {
        PerformanceTier::Moderate
    } else {
        PerformanceTier::Poor
    }
}

/// Human-readable metric strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedMetrics {
    /// Vehicles in the network.
    pub total_vehicles: u32,
    /// e.g. `32.5 km/h`.
    pub avg_speed: String,
    /// Travel time in minutes, e.g. `3.5 min`.
    pub avg_travel_time: String,
    /// e.g. `120.4 kg/h`.
    pub co2_emissions: String,
    /// Active emergency vehicles.
    pub emergency_vehicles_active: u32,
    /// Completed trips.
    pub completed_trips: u32,
    /// e.g. `45 s`.
    pub waiting_time: String,
}

impl Default for FormattedMetrics {
    fn default() -> Self {
        Self {
            total_vehicles: 0,
            avg_speed: "0 km/h".to_owned(),
            avg_travel_time: "0 min".to_owned(),
            co2_emissions: "0 kg/h".to_owned(),
            emergency_vehicles_active: 0,
            completed_trips: 0,
            waiting_time: "0 s".to_owned(),
        }
    }
}

/// Format metrics for display; zero placeholders when absent.
pub fn format_metrics(metrics: Option<&SimulationMetrics>) -> FormattedMetrics {
    let Some(m) = metrics else {
        return FormattedMetrics::default();
    };
    FormattedMetrics {
        total_vehicles: m.total_vehicles,
        avg_speed: format!("{:.1} km/h", m.avg_speed),
        avg_travel_time: format!("{:.1} min", m.avg_travel_time / 60.0),
        co2_emissions: format!("{:.1} kg/h", m.co2_emissions),
        emergency_vehicles_active: m.emergency_vehicles_active,
        completed_trips: m.completed_trips,
        waiting_time: format!("{:.0} s", m.waiting_time),
    }
}

/// Vehicle counts per class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VehicleCounts {
    /// Private cars.
    pub passenger: usize,
    /// Buses.
    pub bus: usize,
    /// Trucks.
    pub truck: usize,
    /// Emergency vehicles.
    pub emergency: usize,
}

impl VehicleCounts {
    /// Count for one class.
    pub const fn of(&self, vehicle_type: VehicleType) -> usize {
        match vehicle_type {
            VehicleType::Passenger => self.passenger,
            VehicleType::Bus => self.bus,
            VehicleType::Truck => self.truck,
            VehicleType::Emergency => self.emergency,
        }
    }

    /// Sum over all classes.
    pub const fn total(&self) -> usize {
        self.passenger
            .saturating_add(self.bus)
            .saturating_add(self.truck)
            .saturating_add(self.emergency)
    }
}

/// Count mirrored vehicles by class.
pub fn count_vehicles(vehicles: &BTreeMap<VehicleId, Vehicle>) -> VehicleCounts {
    vehicles
        .values()
        .fold(VehicleCounts::default(), |mut counts, v| {
            let slot = match v.vehicle_type {
                VehicleType::Passenger => &mut counts.passenger,
                VehicleType::Bus => &mut counts.bus,
                VehicleType::Truck => &mut counts.truck,
                VehicleType::Emergency => &mut counts.emergency,
            };
            *slot = slot.saturating_add(1);
            counts
        })
}

/// Junction queue summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSummary {
    /// Queued vehicles across all junctions.
    pub total_queued: u32,
    /// Junction with the longest queue and its length. Ties go to the
    /// lexicographically first junction id.
    pub busiest: Option<(String, u32)>,
}

/// Summarize per-junction queue lengths.
pub fn summarize_queues(metrics: Option<&SimulationMetrics>) -> QueueSummary {
    let Some(m) = metrics else {
        return QueueSummary::default();
    };
    let total_queued = m
        .queue_lengths
        .values()
        .fold(0_u32, |acc, n| acc.saturating_add(*n));
    let busiest = m
        .queue_lengths
        .iter()
        .fold(None::<(&String, u32)>, |best, (id, &n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((id, n)),
        })
        .map(|(id, n)| (id.clone(), n));
    QueueSummary {
        total_queued,
        busiest,
    }
}

/// Everything the dashboard header and metrics panel render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    /// Store revision this view was computed from.
    pub revision: u64,
    /// Performance tier.
    pub performance: PerformanceTier,
    /// Formatted metrics.
    pub metrics: FormattedMetrics,
    /// Vehicle counts by class.
    pub vehicles: VehicleCounts,
    /// Traffic lights mirrored.
    pub traffic_lights: usize,
    /// Queue summary.
    pub queues: QueueSummary,
    /// Run state.
    pub run: RunState,
}

/// Compute the dashboard view from a state.
pub fn dashboard(state: &SimulationState, revision: u64) -> DashboardView {
    let metrics = state.metrics.as_ref();
    DashboardView {
        revision,
        performance: classify_performance(metrics),
        metrics: format_metrics(metrics),
        vehicles: count_vehicles(&state.vehicles),
        traffic_lights: state.traffic_lights.len(),
        queues: summarize_queues(metrics),
        run: state.run.clone(),
    }
}

/// Store-backed views with a per-revision memo.
#[derive(Debug, Clone)]
pub struct DerivedViews {
    store: CanonicalStore,
    cached: Arc<Mutex<Option<Arc<DashboardView>>>>,
}

impl DerivedViews {
    /// Views over `store`.
    pub fn new(store: CanonicalStore) -> Self {
        Self {
            store,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// The dashboard view for the store's current revision.
    pub fn dashboard(&self) -> Arc<DashboardView> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.read_mirror(|mirror| {
            if let Some(view) = cached.as_ref().filter(|v| v.revision == mirror.revision) {
                return Arc::clone(view);
            }
            let view = Arc::new(dashboard(&mirror.state, mirror.revision));
            *cached = Some(Arc::clone(&view));
            view
        })
    }

    /// Current performance tier.
    pub fn performance(&self) -> PerformanceTier {
        self.store.read(|s| classify_performance(s.metrics.as_ref()))
    }

    /// Current formatted metrics.
    pub fn formatted_metrics(&self) -> FormattedMetrics {
        self.store.read(|s| format_metrics(s.metrics.as_ref()))
    }

    /// Current vehicle counts.
    pub fn vehicle_counts(&self) -> VehicleCounts {
        self.store.read(|s| count_vehicles(&s.vehicles))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use urbanflow_types::Position;

    use super::*;

    fn metrics(avg_speed: f64, avg_travel_time: f64) -> SimulationMetrics {
        SimulationMetrics {
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            total_vehicles: 42,
            avg_speed,
            avg_travel_time,
            co2_emissions: 120.44,
            queue_lengths: BTreeMap::new(),
            emergency_vehicles_active: 1,
            completed_trips: 7,
            waiting_time: 44.6,
        }
    }

    fn vehicle(id: &str, vehicle_type: VehicleType) -> Vehicle {
        Vehicle {
            id: VehicleId::new(id),
            vehicle_type,
            position: Position::new(0.0, 0.0),
            speed: 0.0,
            lane: String::new(),
            route: Vec::new(),
            angle: None,
            color: None,
        }
    }

    #[test]
    fn classification_examples() {
        assert_eq!(
            classify_performance(Some(&metrics(45.0, 100.0))),
            PerformanceTier::Excellent
        );
        assert_eq!(
            classify_performance(Some(&metrics(20.0, 250.0))),
            PerformanceTier::Moderate
        );
        assert_eq!(classify_performance(None), PerformanceTier::Unknown);
    }

    #[test]
    fn classification_boundaries_are_strict() {
        assert_eq!(
            classify_performance(Some(&metrics(40.0, 100.0))),
            PerformanceTier::Good
        );
        assert_eq!(
            classify_performance(Some(&metrics(30.0, 300.0))),
            PerformanceTier::Moderate
        );
        assert_eq!(
            classify_performance(Some(&metrics(15.0, 100.0))),
            PerformanceTier::Poor
        );
        assert_eq!(
            classify_performance(Some(&metrics(50.0, 500.0))),
            PerformanceTier::Poor
        );
    }

    #[test]
    fn formatting() {
        let f = format_metrics(Some(&metrics(32.46, 210.0)));
        assert_eq!(f.avg_speed, "32.5 km/h");
        assert_eq!(f.avg_travel_time, "3.5 min");
        assert_eq!(f.co2_emissions, "120.4 kg/h");
        assert_eq!(f.waiting_time, "45 s");
        assert_eq!(f.total_vehicles, 42);
    }

    #[test]
    fn formatting_without_metrics_uses_placeholders() {
        let f = format_metrics(None);
        assert_eq!(f.avg_speed, "0 km/h");
        assert_eq!(f.avg_travel_time, "0 min");
        assert_eq!(f.co2_emissions, "0 kg/h");
        assert_eq!(f.waiting_time, "0 s");
    }

    #[test]
    fn counts_by_type() {
        let vehicles: BTreeMap<_, _> = [
            vehicle("a", VehicleType::Passenger),
            vehicle("b", VehicleType::Passenger),
            vehicle("c", VehicleType::Bus),
            vehicle("d", VehicleType::Emergency),
        ]
        .into_iter()
        .map(|v| (v.id.clone(), v))
        .collect();
        let counts = count_vehicles(&vehicles);
        assert_eq!(counts.of(VehicleType::Passenger), 2);
        assert_eq!(counts.of(VehicleType::Truck), 0);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn busiest_junction_ties_go_to_first_id() {
        let mut m = metrics(30.0, 200.0);
        m.queue_lengths = [("j_b", 6), ("j_a", 6), ("j_c", 2)]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect();
        let summary = summarize_queues(Some(&m));
        assert_eq!(summary.total_queued, 14);
        assert_eq!(summary.busiest, Some(("j_a".to_owned(), 6)));
    }

    #[test]
    fn dashboard_is_memoized_per_revision() {
        let store = CanonicalStore::new();
        let views = DerivedViews::new(store.clone());

        let first = views.dashboard();
        let again = views.dashboard();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.performance, PerformanceTier::Unknown);

        store.replace_metrics(metrics(45.0, 100.0));
        let updated = views.dashboard();
        assert!(!Arc::ptr_eq(&first, &updated));
        assert_eq!(updated.performance, PerformanceTier::Excellent);
        assert_eq!(updated.revision, store.revision());
    }

    #[test]
    fn dashboard_reflects_reset() {
        let store = CanonicalStore::new();
        let views = DerivedViews::new(store.clone());
        store.replace_vehicles(vec![vehicle("a", VehicleType::Truck)]);
        store.replace_metrics(metrics(20.0, 250.0));
        assert_eq!(views.dashboard().vehicles.truck, 1);

        store.reset();
        let view = views.dashboard();
        assert_eq!(view.vehicles.total(), 0);
        assert_eq!(view.performance, PerformanceTier::Unknown);
        assert_eq!(view.metrics, FormattedMetrics::default());
    }
}
