//! Wire protocol: Socket.IO v4 framing over Engine.IO v4
//!
//! Only the text packet types used by the quote server are supported.
//! Binary attachments and acknowledgements are decoded far enough to be
//! skipped, never produced.

use crate::bus::{AlertCategory, AlertEvent, Tick};
use crate::credentials::UserRef;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Socket.IO connect request for the default namespace
pub const CONNECT_PACKET: &str = "40";
/// Engine.IO pong with no payload
pub const PONG_PACKET: &str = "3";

/// Protocol errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Empty frame
    #[error("Empty packet")]
    Empty,
    /// Unrecognized packet type
    #[error("Unknown packet type: {0}")]
    UnknownPacket(String),
    /// Packet body could not be decoded
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    /// Base URL cannot be turned into a socket URL
    #[error("Unsupported URL: {0}")]
    InvalidUrl(String),
}

/// Engine.IO handshake data
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    /// Session id
    pub sid: String,
    /// Server ping interval in milliseconds
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Grace period for a ping in milliseconds
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}
fn default_ping_timeout() -> u64 {
    20_000
}

/// Engine.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// Session opened
    Open(OpenInfo),
    /// Server closed the session
    Close,
    /// Heartbeat from the server
    Ping(String),
    /// Heartbeat reply
    Pong(String),
    /// Socket.IO payload
    Message(SocketPacket),
    /// Transport upgrade (unused on a websocket-only session)
    Upgrade,
    /// No-op
    Noop,
}

/// Socket.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace connect acknowledged
    Connect(Value),
    /// Namespace disconnected by the server
    Disconnect,
    /// Named event with its first argument
    Event {
        /// Event name
        name: String,
        /// First argument, `Null` when absent
        data: Value,
    },
    /// Server refused the namespace connection
    ConnectError(Value),
    /// Acknowledgement or binary packet
    Ignored,
}

/// Decode one websocket text frame
pub fn decode_packet(text: &str) -> Result<EnginePacket, ProtocolError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let body = chars.as_str();

    match kind {
        '0' => serde_json::from_str(body)
            .map(EnginePacket::Open)
            .map_err(|e| ProtocolError::InvalidPayload(e.to_string())),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(body.to_string())),
        '3' => Ok(EnginePacket::Pong(body.to_string())),
        '4' => decode_socket_packet(body).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(ProtocolError::UnknownPacket(other.to_string())),
    }
}

fn decode_socket_packet(text: &str) -> Result<SocketPacket, ProtocolError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let body = skip_namespace(chars.as_str());

    match kind {
        '0' => Ok(SocketPacket::Connect(parse_optional_json(body)?)),
        '1' => Ok(SocketPacket::Disconnect),
        '2' => decode_event(body),
        '4' => Ok(SocketPacket::ConnectError(parse_optional_json(body)?)),
        '3' | '5' | '6' => Ok(SocketPacket::Ignored),
        other => Err(ProtocolError::UnknownPacket(format!("4{}", other))),
    }
}

fn skip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        }
    } else {
        body
    }
}

fn parse_optional_json(body: &str) -> Result<Value, ProtocolError> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
}

fn decode_event(body: &str) -> Result<SocketPacket, ProtocolError> {
    // Optional ack id precedes the argument array
    let args = body.trim_start_matches(|c: char| c.is_ascii_digit());
    let value: Value =
        serde_json::from_str(args).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
    let Value::Array(mut items) = value else {
        return Err(ProtocolError::InvalidPayload(
            "event arguments must be an array".to_string(),
        ));
    };
    if items.is_empty() {
        return Err(ProtocolError::InvalidPayload("missing event name".to_string()));
    }
    let name = match items.remove(0) {
        Value::String(name) => name,
        other => {
            return Err(ProtocolError::InvalidPayload(format!(
                "event name must be a string, got {}",
                other
            )))
        }
    };
    let data = if items.is_empty() {
        Value::Null
    } else {
        items.remove(0)
    };
    Ok(SocketPacket::Event { name, data })
}

/// Encode a Socket.IO event on the default namespace
pub fn encode_event(name: &str, data: &Value) -> String {
    format!("42{}", json!([name, data]))
}

/// Build the websocket URL for a server base URL
///
/// `http(s)://host[:port][/]` becomes
/// `ws(s)://host[:port]/socket.io/?EIO=4&transport=websocket`.
pub fn socket_url(base: &str) -> Result<String, ProtocolError> {
    let base = base.trim().trim_end_matches('/');
    let (scheme, rest) = base
        .split_once("://")
        .ok_or_else(|| ProtocolError::InvalidUrl(base.to_string()))?;
    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(ProtocolError::InvalidUrl(base.to_string())),
    };
    if rest.is_empty() {
        return Err(ProtocolError::InvalidUrl(base.to_string()));
    }
    Ok(format!(
        "{}://{}/socket.io/?EIO=4&transport=websocket",
        ws_scheme, rest
    ))
}

/// Application messages the server pushes
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Token accepted
    AuthSuccess {
        /// Profile echoed by the server
        user: Option<UserRef>,
    },
    /// Token refused
    AuthError {
        /// Human-readable reason
        message: String,
    },
    /// Current snapshot of tracked symbols
    StockUpdate(Vec<Tick>),
    /// Server-evaluated notification
    Notification(AlertEvent),
    /// Event this client does not handle
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct RawNotification {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

impl ServerMessage {
    /// Interpret a Socket.IO event
    pub fn from_event(name: &str, data: Value) -> Result<Self, ProtocolError> {
        match name {
            "auth_success" => {
                let user = data
                    .get("user")
                    .cloned()
                    .and_then(|u| serde_json::from_value(u).ok());
                Ok(ServerMessage::AuthSuccess { user })
            }
            "auth_error" => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Authentication failed")
                    .to_string();
                Ok(ServerMessage::AuthError { message })
            }
            "stockUpdate" => Ok(ServerMessage::StockUpdate(parse_ticks(data)?)),
            "notification" => {
                let raw: RawNotification = serde_json::from_value(data)
                    .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
                Ok(ServerMessage::Notification(raw.into_alert()))
            }
            other => Ok(ServerMessage::Unknown(other.to_string())),
        }
    }

    /// Whether this message carries market data or alerts
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            ServerMessage::StockUpdate(_) | ServerMessage::Notification(_)
        )
    }
}

/// Parse a tick batch, skipping individual malformed entries
fn parse_ticks(data: Value) -> Result<Vec<Tick>, ProtocolError> {
    let items = match data {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => {
            return Err(ProtocolError::InvalidPayload(
                "stockUpdate payload must be an array".to_string(),
            ))
        }
    };

    let mut ticks = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<Tick>(item) {
            Ok(tick) => ticks.push(tick),
            Err(e) => tracing::warn!(error = %e, "Skipping malformed tick"),
        }
    }
    Ok(ticks)
}

impl RawNotification {
    fn into_alert(self) -> AlertEvent {
        let category = match self.kind.as_deref() {
            Some("stock_alert") => AlertCategory::StockAlert,
            Some("connection_status") => AlertCategory::ConnectionStatus,
            _ => AlertCategory::Generic,
        };
        let alert = self.data.get("alert");
        let lookup = |field: &str| {
            self.data
                .get(field)
                .or_else(|| alert.and_then(|a| a.get(field)))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let symbol = lookup("symbol").unwrap_or_default();
        let kind = lookup("alertType")
            .or_else(|| self.kind.clone())
            .unwrap_or_else(|| "generic".to_string());

        AlertEvent {
            symbol,
            kind,
            title: self.title,
            message: self.message,
            category,
        }
    }
}
