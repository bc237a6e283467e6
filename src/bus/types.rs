//! Update bus types

use crate::connection::StateChange;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Latest price fields for one symbol, as pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Trading symbol (e.g., "TCS.NS")
    pub symbol: String,
    /// Last traded price
    pub price: Decimal,
    /// Server timestamp, when present and parseable
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    /// Remaining quote fields (change, volume, history, ...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Tick {
    /// Create a tick with no extra fields
    pub fn new(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: None,
            fields: Map::new(),
        }
    }

    /// Numeric extra field, if present
    pub fn field_f64(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }
}

/// Accepts RFC 3339 strings or epoch milliseconds; anything else is `None`
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    })
}

/// Origin of a server-pushed notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    /// A server-evaluated price alert fired
    StockAlert,
    /// Server-side connection status message
    ConnectionStatus,
    /// Anything else
    Generic,
}

/// Server-evaluated alert pushed over the live channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Symbol the alert concerns; empty for non-stock notifications
    pub symbol: String,
    /// Alert kind (e.g., "buy", "sell")
    pub kind: String,
    /// Notification title
    pub title: String,
    /// Notification body
    pub message: String,
    /// Where the alert came from
    pub category: AlertCategory,
}

/// What a subscriber wants to receive
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every tick batch
    AllTicks,
    /// Tick batches that mention this symbol
    Symbol(String),
    /// Alert events
    Alerts,
    /// Connection state changes
    ConnectionState,
}

impl Topic {
    /// Subscribe to a single symbol
    pub fn symbol(symbol: impl Into<String>) -> Self {
        Topic::Symbol(symbol.into())
    }

    /// Whether an event should be delivered to this topic
    pub fn matches(&self, event: &BusEvent) -> bool {
        match (self, event) {
            (Topic::AllTicks, BusEvent::Ticks(_)) => true,
            (Topic::Symbol(symbol), BusEvent::Ticks(batch)) => {
                batch.iter().any(|tick| &tick.symbol == symbol)
            }
            (Topic::Alerts, BusEvent::Alert(_)) => true,
            (Topic::ConnectionState, BusEvent::State(_)) => true,
            _ => false,
        }
    }
}

/// Event delivered to subscribers
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// Full tick batch, shared between subscribers
    Ticks(Arc<Vec<Tick>>),
    /// Alert event
    Alert(AlertEvent),
    /// Connection state transition
    State(StateChange),
}
