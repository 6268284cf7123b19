//! State-synchronization core for the Urban Flow dashboard.
//!
//! No I/O lives here. Decoded [`urbanflow_types::Message`]s are published
//! on an [`EventBus`]; the [`CanonicalStore`] subscribes to the kinds it
//! owns and applies them; [`DerivedViews`] project the store for display.
//!
//! # Modules
//!
//! - [`bus`] -- Kind-routed synchronous publish/subscribe
//! - [`store`] -- The canonical mirror and its merge rules
//! - [`views`] -- Pure, memoized projections of the store

pub mod bus;
pub mod store;
pub mod views;

pub use bus::{Delivery, EventBus, Routed, Subscription};
pub use store::{CanonicalStore, Mirror, STORE_KINDS, SimulationState};
pub use views::{
    DashboardView, DerivedViews, FormattedMetrics, QueueSummary, VehicleCounts,
    classify_performance, count_vehicles, format_metrics, summarize_queues,
};
