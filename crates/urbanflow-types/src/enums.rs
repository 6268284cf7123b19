//! Enumeration types for the Urban Flow data model.

use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Vehicles
// ---------------------------------------------------------------------------

/// The closed set of vehicle classes the simulation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum VehicleType {
    /// Private car.
    Passenger,
    /// Public transport bus.
    Bus,
    /// Heavy goods vehicle.
    Truck,
    /// Ambulance, fire engine, or police vehicle with signal priority.
    Emergency,
}

impl VehicleType {
    /// All vehicle types, in display order.
    pub const ALL: [Self; 4] = [Self::Passenger, Self::Bus, Self::Truck, Self::Emergency];

    /// Wire name of this vehicle type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passenger => "passenger",
            Self::Bus => "bus",
            Self::Truck => "truck",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Traffic density class of a scenario.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "kebab-case")]
#[ts(export, export_to = "bindings/")]
pub enum TrafficDensity {
    /// Light traffic (weekend, night).
    Low,
    /// Standard urban traffic.
    #[default]
    Medium,
    /// Heavy traffic.
    High,
    /// Rush-hour saturation.
    VeryHigh,
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Coarse run status reported by the backend in `simulation_status`
/// messages.
///
/// Expands to the running/paused flags of the run state:
/// `running` is running and not paused, `paused` is running and paused,
/// `stopped` is neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The simulation is advancing.
    Running,
    /// The simulation is started but paused.
    Paused,
    /// The simulation is not running.
    Stopped,
}

impl RunStatus {
    /// The `(is_running, is_paused)` flags this status implies.
    pub const fn flags(self) -> (bool, bool) {
        match self {
            Self::Running => (true, false),
            Self::Paused => (true, true),
            Self::Stopped => (false, false),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// An action completed.
    Success,
    /// Informational message.
    #[default]
    Info,
    /// Something degraded but the dashboard keeps working.
    Warning,
    /// An action failed.
    Error,
    /// Emergency-vehicle related notice.
    Emergency,
    /// A level this client does not recognize.
    #[serde(other)]
    Other,
}

/// Priority attached to an emergency alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority (the backend's default for emergency alerts).
    High,
    /// Critical priority.
    Critical,
    /// A priority this client does not recognize.
    #[serde(other)]
    Other,
}

// ---------------------------------------------------------------------------
// Derived classification
// ---------------------------------------------------------------------------

/// Network performance tier derived from average speed and travel time.
///
/// Tiers are ordered from best to worst; [`PerformanceTier::Unknown`] is
/// used when no metrics have been received yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum PerformanceTier {
    /// Free-flowing traffic.
    Excellent,
    /// Minor slowdowns.
    Good,
    /// Noticeable congestion.
    Moderate,
    /// Heavy congestion.
    Poor,
    /// No metrics available.
    Unknown,
}

impl PerformanceTier {
    /// Lowercase label used by the dashboard.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Moderate => "moderate",
            Self::Poor => "poor",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_type_wire_names() {
        for vt in VehicleType::ALL {
            let json = serde_json::to_string(&vt).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", vt.as_str()));
        }
    }

    #[test]
    fn density_uses_kebab_case() {
        let density: Result<TrafficDensity, _> = serde_json::from_str("\"very-high\"");
        assert_eq!(density.ok(), Some(TrafficDensity::VeryHigh));
    }

    #[test]
    fn run_status_flags() {
        assert_eq!(RunStatus::Running.flags(), (true, false));
        assert_eq!(RunStatus::Paused.flags(), (true, true));
        assert_eq!(RunStatus::Stopped.flags(), (false, false));
    }

    #[test]
    fn unknown_notification_level_maps_to_other() {
        let level: Result<NotificationLevel, _> = serde_json::from_str("\"celebration\"");
        assert_eq!(level.ok(), Some(NotificationLevel::Other));
    }

    #[test]
    fn performance_tiers_are_ordered_best_first() {
        assert!(PerformanceTier::Excellent < PerformanceTier::Good);
        assert!(PerformanceTier::Moderate < PerformanceTier::Poor);
        assert!(PerformanceTier::Poor < PerformanceTier::Unknown);
    }
}
