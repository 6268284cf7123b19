//! Wire envelope for the streaming connection.
//!
//! Every text frame is a JSON object `{ "type": <kind>, "data": <payload>,
//! "timestamp"?: <number|string> }`. Decoding happens in two steps: the
//! outer envelope is parsed into a raw form, then `data` is parsed into
//! the payload type selected by `type` and validated. A frame that fails
//! either step never reaches a subscriber.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::{AlertPriority, NotificationLevel};
use crate::structs::{SimulationMetrics, Vehicle};
use crate::updates::{
    MetricsUpdate, RunStatePatch, SimulationSnapshot, TrafficLightUpdateBatch, VehicleUpdateBatch,
};
use crate::validate::{Validate, ValidationError};

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Discriminant of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Full snapshot of vehicles, lights, metrics, and run state.
    SimulationUpdate,
    /// Batch of per-vehicle deltas.
    VehicleUpdate,
    /// Batch of per-light deltas.
    TrafficLightUpdate,
    /// Replacement metrics.
    MetricsUpdate,
    /// Run-state patch.
    SimulationStatus,
    /// User-facing notification.
    Notification,
    /// Emergency vehicle alert.
    EmergencyAlert,
    /// Backend-reported error.
    Error,
    /// Connection opened.
    Connect,
    /// Connection closed.
    Disconnect,
    /// Clear the local mirror. Client-local: never accepted from the wire.
    Reset,
    /// Flip the optimization flag against the mirror's current value.
    /// Client-local.
    ToggleOptimization,
}

impl MessageKind {
    /// Every kind, wire kinds first.
    pub const ALL: [Self; 12] = [
        Self::SimulationUpdate,
        Self::VehicleUpdate,
        Self::TrafficLightUpdate,
        Self::MetricsUpdate,
        Self::SimulationStatus,
        Self::Notification,
        Self::EmergencyAlert,
        Self::Error,
        Self::Connect,
        Self::Disconnect,
        Self::Reset,
        Self::ToggleOptimization,
    ];

    /// The `type` string used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimulationUpdate => "simulation_update",
            Self::VehicleUpdate => "vehicle_update",
            Self::TrafficLightUpdate => "traffic_light_update",
            Self::MetricsUpdate => "metrics_update",
            Self::SimulationStatus => "simulation_status",
            Self::Notification => "notification",
            Self::EmergencyAlert => "emergency_alert",
            Self::Error => "error",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Reset => "reset",
            Self::ToggleOptimization => "toggle_optimization",
        }
    }

    /// Look up a kind by its `type` string.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Whether this kind only ever originates inside the client.
    pub const fn is_local_only(self) -> bool {
        matches!(self, Self::Reset | Self::ToggleOptimization)
    }

    /// Whether this kind arrives at a high rate and should only be
    /// logged at trace level.
    pub const fn is_high_rate(self) -> bool {
        matches!(self, Self::SimulationUpdate | Self::VehicleUpdate)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Small payloads
// ---------------------------------------------------------------------------

/// Payload of `notification`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity. The backend sends it as `type`.
    #[serde(
        default,
        rename = "type",
        alias = "level",
        alias = "notification_type"
    )]
    pub level: NotificationLevel,
    /// Text shown to the user.
    pub message: String,
}

impl Notification {
    /// Create a notification.
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Payload of `emergency_alert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAlert {
    /// Text shown to the user.
    pub message: String,
    /// Alert priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<AlertPriority>,
    /// The emergency vehicle involved, when the backend includes one in
    /// the mirrored vehicle shape. Other shapes are dropped, not rejected.
    #[serde(
        default,
        deserialize_with = "vehicle_if_valid",
        skip_serializing_if = "Option::is_none"
    )]
    pub vehicle: Option<Vehicle>,
}

fn vehicle_if_valid<'de, D>(deserializer: D) -> Result<Option<Vehicle>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerError {
    /// Error description.
    pub message: String,
    /// Machine-readable code.
    #[serde(default, alias = "error_code", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Payload of `connect` and `disconnect`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionNotice {
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Session id assigned by the backend.
    #[serde(default, alias = "client_id", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl ConnectionNotice {
    /// A notice carrying only a message.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            client_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A decoded, validated message: one variant per [`MessageKind`], each
/// carrying its exact payload shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `simulation_update`.
    SimulationUpdate(Box<SimulationSnapshot>),
    /// `vehicle_update`.
    VehicleUpdate(VehicleUpdateBatch),
    /// `traffic_light_update`.
    TrafficLightUpdate(TrafficLightUpdateBatch),
    /// `metrics_update`, unwrapped from its `{ metrics }` wrapper.
    MetricsUpdate(Box<SimulationMetrics>),
    /// `simulation_status`.
    SimulationStatus(Box<RunStatePatch>),
    /// `notification`.
    Notification(Notification),
    /// `emergency_alert`.
    EmergencyAlert(Box<EmergencyAlert>),
    /// `error`.
    Error(ServerError),
    /// `connect`.
    Connect(ConnectionNotice),
    /// `disconnect`.
    Disconnect(ConnectionNotice),
    /// `reset` (client-local).
    Reset,
    /// `toggle_optimization` (client-local).
    ToggleOptimization,
}

impl Message {
    /// The kind of this message.
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::SimulationUpdate(_) => MessageKind::SimulationUpdate,
            Self::VehicleUpdate(_) => MessageKind::VehicleUpdate,
            Self::TrafficLightUpdate(_) => MessageKind::TrafficLightUpdate,
            Self::MetricsUpdate(_) => MessageKind::MetricsUpdate,
            Self::SimulationStatus(_) => MessageKind::SimulationStatus,
            Self::Notification(_) => MessageKind::Notification,
            Self::EmergencyAlert(_) => MessageKind::EmergencyAlert,
            Self::Error(_) => MessageKind::Error,
            Self::Connect(_) => MessageKind::Connect,
            Self::Disconnect(_) => MessageKind::Disconnect,
            Self::Reset => MessageKind::Reset,
            Self::ToggleOptimization => MessageKind::ToggleOptimization,
        }
    }

    /// Parse and validate the `data` member of an envelope of `kind`.
    ///
    /// A missing or `null` payload is treated as an empty object, so
    /// kinds whose payload fields are all optional decode without one.
    pub fn from_data(kind: MessageKind, data: Value) -> Result<Self, DecodeError> {
        let data = if data.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            data
        };
        let message = match kind {
            MessageKind::SimulationUpdate => {
                Self::SimulationUpdate(Box::new(payload(kind, data)?))
            }
            MessageKind::VehicleUpdate => Self::VehicleUpdate(payload(kind, data)?),
            MessageKind::TrafficLightUpdate => Self::TrafficLightUpdate(payload(kind, data)?),
            MessageKind::MetricsUpdate => {
                let update: MetricsUpdate = payload(kind, data)?;
                Self::MetricsUpdate(Box::new(update.metrics))
            }
            MessageKind::SimulationStatus => {
                Self::SimulationStatus(Box::new(payload(kind, data)?))
            }
            MessageKind::Notification => Self::Notification(payload(kind, data)?),
            MessageKind::EmergencyAlert => Self::EmergencyAlert(Box::new(payload(kind, data)?)),
            MessageKind::Error => Self::Error(payload(kind, data)?),
            MessageKind::Connect => Self::Connect(payload(kind, data)?),
            MessageKind::Disconnect => Self::Disconnect(payload(kind, data)?),
            MessageKind::Reset => Self::Reset,
            MessageKind::ToggleOptimization => Self::ToggleOptimization,
        };
        message
            .check()
            .map_err(|source| DecodeError::Invalid { kind, source })?;
        Ok(message)
    }

    /// Serialize the payload back into its `data` form.
    pub fn to_data(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::SimulationUpdate(snapshot) => serde_json::to_value(snapshot),
            Self::VehicleUpdate(batch) => serde_json::to_value(batch),
            Self::TrafficLightUpdate(batch) => serde_json::to_value(batch),
            Self::MetricsUpdate(metrics) => serde_json::to_value(MetricsUpdate {
                metrics: metrics.as_ref().clone(),
            }),
            Self::SimulationStatus(patch) => serde_json::to_value(patch),
            Self::Notification(notification) => serde_json::to_value(notification),
            Self::EmergencyAlert(alert) => serde_json::to_value(alert),
            Self::Error(error) => serde_json::to_value(error),
            Self::Connect(notice) | Self::Disconnect(notice) => serde_json::to_value(notice),
            Self::Reset | Self::ToggleOptimization => Ok(Value::Null),
        }
    }

    fn check(&self) -> Result<(), ValidationError> {
        match self {
            Self::SimulationUpdate(snapshot) => snapshot.validate(),
            Self::VehicleUpdate(batch) => batch.validate(),
            Self::TrafficLightUpdate(batch) => batch.validate(),
            Self::MetricsUpdate(metrics) => metrics.validate(),
            Self::SimulationStatus(patch) => patch.validate(),
            Self::Notification(_)
            | Self::EmergencyAlert(_)
            | Self::Error(_)
            | Self::Connect(_)
            | Self::Disconnect(_)
            | Self::Reset
            | Self::ToggleOptimization => Ok(()),
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    kind: MessageKind,
    data: Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::Payload { kind, source })
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Envelope timestamp: the backend sends either epoch numbers or
/// ISO-8601 strings depending on the code path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Numeric epoch timestamp (seconds or milliseconds).
    Epoch(f64),
    /// ISO-8601 timestamp string.
    Text(String),
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The typed message.
    pub message: Message,
    /// Sender timestamp, when present.
    pub timestamp: Option<Timestamp>,
}

#[derive(Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<Timestamp>,
}

impl Envelope {
    /// Wrap a message without a timestamp.
    pub const fn new(message: Message) -> Self {
        Self {
            message,
            timestamp: None,
        }
    }

    /// Attach a timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let raw = RawEnvelope {
            kind: self.message.kind().as_str().to_owned(),
            data: self.message.to_data()?,
            timestamp: self.timestamp.clone(),
        };
        serde_json::to_string(&raw)
    }
}

/// Decode one text frame into a validated [`Envelope`].
///
/// # Errors
///
/// Returns a [`DecodeError`] if the frame is not JSON, names an unknown or
/// client-local kind, or carries a payload that does not match its kind.
pub fn decode_frame(text: &str) -> Result<Envelope, DecodeError> {
    let raw: RawEnvelope = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
    let kind = MessageKind::from_name(&raw.kind).ok_or(DecodeError::UnknownKind(raw.kind))?;
    if kind.is_local_only() {
        return Err(DecodeError::LocalOnly(kind));
    }
    let message = Message::from_data(kind, raw.data)?;
    Ok(Envelope {
        message,
        timestamp: raw.timestamp,
    })
}

/// Why a frame could not be turned into an [`Envelope`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not a JSON envelope.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The `type` member names no known kind.
    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    /// The `type` member names a client-local kind.
    #[error("message kind `{0}` is client-local and cannot arrive over the wire")]
    LocalOnly(MessageKind),

    /// The `data` member does not match the kind's payload shape.
    #[error("invalid `{kind}` payload: {source}")]
    Payload {
        /// Kind named by the envelope.
        kind: MessageKind,
        /// The underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The payload decoded but violates a data-model invariant.
    #[error("invalid `{kind}` payload: {source}")]
    Invalid {
        /// Kind named by the envelope.
        kind: MessageKind,
        /// The violated invariant.
        #[source]
        source: ValidationError,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::enums::RunStatus;
    use crate::ids::VehicleId;

    #[test]
    fn kind_names_round_trip() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::from_name("pong"), None);
    }

    #[test]
    fn decodes_vehicle_update_without_timestamp() {
        let frame = json!({
            "type": "vehicle_update",
            "data": {"updates": [{"id": "v1", "speed": 42, "position": {"lat": 1, "lng": 2}}]}
        })
        .to_string();
        let batch = match decode_frame(&frame) {
            Ok(Envelope {
                message: Message::VehicleUpdate(batch),
                timestamp: None,
            }) => batch,
            other => panic!("unexpected decode result: {other:?}"),
        };
        assert_eq!(batch.updates.len(), 1);
        assert_eq!(batch.updates.first().map(|u| u.id.clone()), Some(VehicleId::new("v1")));
        assert_eq!(batch.updates.first().and_then(|u| u.speed), Some(42.0));
    }

    #[test]
    fn metrics_update_is_unwrapped() {
        let frame = json!({
            "type": "metrics_update",
            "data": {"metrics": {
                "timestamp": "2024-01-25T14:30:00Z",
                "totalVehicles": 50,
                "avgSpeed": 32.5,
                "avgTravelTime": 210.0,
                "co2Emissions": 120.4,
                "queueLengths": {"junction_1": 4}
            }},
            "timestamp": 1_706_193_000
        })
        .to_string();
        let envelope = decode_frame(&frame);
        assert!(matches!(
            envelope,
            Ok(Envelope {
                message: Message::MetricsUpdate(ref m),
                timestamp: Some(Timestamp::Epoch(_)),
            }) if m.total_vehicles == 50
        ));
    }

    #[test]
    fn status_accepts_iso_timestamp_and_backend_shape() {
        let frame = json!({
            "type": "simulation_status",
            "data": {"status": "paused", "message": "Simulation paused"},
            "timestamp": "2024-01-25T14:30:00Z"
        })
        .to_string();
        let envelope = decode_frame(&frame);
        assert!(matches!(
            envelope,
            Ok(Envelope {
                message: Message::SimulationStatus(ref p),
                timestamp: Some(Timestamp::Text(_)),
            }) if p.status == Some(RunStatus::Paused)
        ));
    }

    #[test]
    fn connect_without_data_decodes() {
        let envelope = decode_frame(r#"{"type":"connect"}"#);
        assert!(matches!(
            envelope,
            Ok(Envelope {
                message: Message::Connect(_),
                ..
            })
        ));
    }

    #[test]
    fn alert_with_foreign_vehicle_shape_still_decodes() {
        let frame = json!({
            "type": "emergency_alert",
            "data": {"message": "Emergency vehicle in transit",
                     "vehicle": {"id": "ev1", "subtype": "ambulance"}}
        })
        .to_string();
        let envelope = decode_frame(&frame);
        assert!(matches!(
            envelope,
            Ok(Envelope {
                message: Message::EmergencyAlert(ref alert),
                ..
            }) if alert.vehicle.is_none()
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            decode_frame("{not json"),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_kind_is_reported_by_name() {
        let result = decode_frame(r#"{"type":"subscription_update","data":{}}"#);
        assert!(matches!(result, Err(DecodeError::UnknownKind(ref k)) if k == "subscription_update"));
    }

    #[test]
    fn reset_cannot_arrive_over_the_wire() {
        let result = decode_frame(r#"{"type":"reset"}"#);
        assert!(matches!(result, Err(DecodeError::LocalOnly(MessageKind::Reset))));
    }

    #[test]
    fn toggle_optimization_cannot_arrive_over_the_wire() {
        let result = decode_frame(r#"{"type":"toggle_optimization","data":{}}"#);
        assert!(matches!(
            result,
            Err(DecodeError::LocalOnly(MessageKind::ToggleOptimization))
        ));
    }

    #[test]
    fn wrong_payload_shape_names_the_kind() {
        let result = decode_frame(r#"{"type":"vehicle_update","data":{"updates":"nope"}}"#);
        assert!(matches!(
            result,
            Err(DecodeError::Payload {
                kind: MessageKind::VehicleUpdate,
                ..
            })
        ));
    }

    #[test]
    fn invariant_violations_are_rejected() {
        let frame = json!({
            "type": "vehicle_update",
            "data": {"updates": [{"id": "v1", "speed": -5}]}
        })
        .to_string();
        assert!(matches!(
            decode_frame(&frame),
            Err(DecodeError::Invalid {
                kind: MessageKind::VehicleUpdate,
                ..
            })
        ));
    }

    #[test]
    fn encode_then_decode_preserves_message() {
        let message = Message::Notification(Notification::new(
            NotificationLevel::Warning,
            "Queue building at junction_2",
        ));
        let text = Envelope::new(message.clone()).encode().unwrap_or_default();
        let decoded = decode_frame(&text).map(|e| e.message).ok();
        assert_eq!(decoded, Some(message));
    }
}
