//! Type-safe identifier wrappers around [`String`].
//!
//! Identifiers are assigned by the simulation backend and arrive as plain
//! strings (`"v1"`, `"tl_junction_3"`, `"rush_hour"`). Wrapping each kind
//! in its own newtype prevents a vehicle id from being used to look up a
//! traffic light at compile time.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
        )]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner [`String`] value.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a vehicle, stable for the vehicle's lifetime.
    VehicleId
}

define_id! {
    /// Unique identifier for a signalized junction's traffic light.
    TrafficLightId
}

define_id! {
    /// Unique identifier for a simulation scenario (e.g. `rush_hour`).
    ScenarioId
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = VehicleId::new("v1");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"v1\"");
    }

    #[test]
    fn ids_deserialize_from_plain_strings() {
        let id: Result<TrafficLightId, _> = serde_json::from_str("\"tl_1\"");
        assert_eq!(id.ok(), Some(TrafficLightId::from("tl_1")));
    }

    #[test]
    fn map_lookup_by_str_slice() {
        let mut map = BTreeMap::new();
        map.insert(VehicleId::new("v7"), 7_u32);
        assert_eq!(map.get("v7"), Some(&7));
        assert_eq!(map.get("v8"), None);
    }

    #[test]
    fn display_matches_inner_value() {
        assert_eq!(ScenarioId::new("rush_hour").to_string(), "rush_hour");
    }
}
