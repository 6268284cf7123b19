//! Boundary validation for decoded payloads.
//!
//! Serde guarantees shape; these checks guarantee the numeric invariants
//! the data model promises (finite coordinates, non-negative speeds,
//! positive multipliers) before anything reaches the store.

use crate::structs::{Position, SimulationMetrics, TrafficLight, Vehicle};
use crate::updates::{
    RunStatePatch, SimulationSnapshot, TrafficLightDelta, TrafficLightUpdateBatch, VehicleDelta,
    VehicleUpdateBatch,
};

/// A payload field that violates a data-model invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub reason: &'static str,
}

impl ValidationError {
    fn new(field: impl Into<String>, reason: &'static str) -> Self {
        Self {
            field: field.into(),
            reason,
        }
    }

    /// Prefix the field path with `scope`.
    fn within(self, scope: &str) -> Self {
        Self {
            field: format!("{scope}.{}", self.field),
            reason: self.reason,
        }
    }
}

/// Types that can check their own invariants.
pub trait Validate {
    /// Check invariants, returning the first violation found.
    fn validate(&self) -> Result<(), ValidationError>;
}

fn finite(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::new(field, "must be a finite number"))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ValidationError> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::new(field, "must not be negative"));
    }
    Ok(())
}

fn positive(field: &str, value: f64) -> Result<(), ValidationError> {
    finite(field, value)?;
    if value <= 0.0 {
        return Err(ValidationError::new(field, "must be positive"));
    }
    Ok(())
}

fn each<T: Validate>(scope: &str, items: &[T]) -> Result<(), ValidationError> {
    for (i, item) in items.iter().enumerate() {
        item.validate().map_err(|e| e.within(&format!("{scope}[{i}]")))?;
    }
    Ok(())
}

impl Validate for Position {
    fn validate(&self) -> Result<(), ValidationError> {
        finite("lat", self.lat)?;
        finite("lng", self.lng)
    }
}

impl Validate for Vehicle {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().is_empty() {
            return Err(ValidationError::new("id", "must not be empty"));
        }
        self.position.validate().map_err(|e| e.within("position"))?;
        non_negative("speed", self.speed)?;
        if let Some(angle) = self.angle {
            finite("angle", angle)?;
        }
        Ok(())
    }
}

impl Validate for TrafficLight {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().is_empty() {
            return Err(ValidationError::new("id", "must not be empty"));
        }
        self.position.validate().map_err(|e| e.within("position"))?;
        if !self.accepts_phase(self.current_phase) {
            return Err(ValidationError::new(
                "currentPhase",
                "must index into phases",
            ));
        }
        if let Some(remaining) = self.remaining_duration {
            non_negative("remainingDuration", remaining)?;
        }
        Ok(())
    }
}

impl Validate for SimulationMetrics {
    fn validate(&self) -> Result<(), ValidationError> {
        non_negative("avgSpeed", self.avg_speed)?;
        non_negative("avgTravelTime", self.avg_travel_time)?;
        non_negative("co2Emissions", self.co2_emissions)?;
        non_negative("waitingTime", self.waiting_time)
    }
}

impl Validate for VehicleDelta {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(position) = &self.position {
            position.validate().map_err(|e| e.within("position"))?;
        }
        if let Some(speed) = self.speed {
            non_negative("speed", speed)?;
        }
        if let Some(angle) = self.angle {
            finite("angle", angle)?;
        }
        Ok(())
    }
}

impl Validate for TrafficLightDelta {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(remaining) = self.remaining_duration {
            non_negative("remainingDuration", remaining)?;
        }
        Ok(())
    }
}

impl Validate for RunStatePatch {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(time) = self.simulation_time {
            non_negative("simulationTime", time)?;
        }
        if let Some(multiplier) = self.speed_multiplier {
            positive("speedMultiplier", multiplier)?;
        }
        Ok(())
    }
}

impl Validate for SimulationSnapshot {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(vehicles) = &self.vehicles {
            each("vehicles", vehicles)?;
        }
        if let Some(lights) = &self.traffic_lights {
            each("trafficLights", lights)?;
        }
        if let Some(metrics) = &self.metrics {
            metrics.validate().map_err(|e| e.within("metrics"))?;
        }
        if let Some(state) = &self.state {
            state.validate().map_err(|e| e.within("state"))?;
        }
        if let Some(time) = self.simulation_time {
            non_negative("simulationTime", time)?;
        }
        Ok(())
    }
}

impl Validate for VehicleUpdateBatch {
    fn validate(&self) -> Result<(), ValidationError> {
        each("updates", &self.updates)
    }
}

impl Validate for TrafficLightUpdateBatch {
    fn validate(&self) -> Result<(), ValidationError> {
        each("updates", &self.updates)
    }
}
