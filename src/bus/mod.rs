//! In-process fan-out of live updates
//!
//! One producer (the connection manager) publishes tick batches, alerts and
//! connection state changes; any number of consumers subscribe by topic.

mod types;
mod update_bus;

pub use types::{AlertCategory, AlertEvent, BusEvent, Tick, Topic};
pub use update_bus::{AlertSink, Subscription, UpdateBus};
