//! Notification types

use crate::bus::AlertEvent;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Platform tag shared by all connection status banners
pub const CONNECTION_STATUS_TAG: &str = "connection-status";

/// Notification permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    /// Not asked yet
    #[default]
    Default,
    /// User allowed notifications
    Granted,
    /// User refused notifications
    Denied,
}

/// Identifier of a shown notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(Uuid);

impl NotificationId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A notification handed to the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Id used to dismiss it later
    pub id: NotificationId,
    /// Title line
    pub title: String,
    /// Body text
    pub body: String,
    /// Platform tag; a new notification with the same tag replaces the old one
    pub tag: String,
}

/// What to show and how to de-duplicate it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyRequest {
    /// Title line
    pub title: String,
    /// Body text
    pub body: String,
    /// Platform tag
    pub tag: String,
    /// A request repeating the key its tag last showed within the dedup
    /// window is suppressed
    pub dedup_key: String,
}

impl NotifyRequest {
    /// Request whose dedup key is the tag plus the exact content
    pub fn new(title: impl Into<String>, body: impl Into<String>, tag: impl Into<String>) -> Self {
        let title = title.into();
        let body = body.into();
        let tag = tag.into();
        let dedup_key = format!("{}|{}|{}", tag, title, body);
        Self {
            title,
            body,
            tag,
            dedup_key,
        }
    }

    /// Override the dedup key
    pub fn dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = key.into();
        self
    }

    /// Connection status banner
    pub fn connection_status(connected: bool) -> Self {
        let (status, title, body) = if connected {
            ("connected", "Connected", "Stock data connection restored")
        } else {
            ("disconnected", "Disconnected", "Lost connection to stock server")
        };
        Self::new(title, body, CONNECTION_STATUS_TAG)
            .dedup_key(format!("{}:{}", CONNECTION_STATUS_TAG, status))
    }

    /// Price alert for one symbol
    pub fn stock_alert(symbol: &str, kind: &str, message: &str) -> Self {
        let title = format!("{} Alert: {}", kind.to_uppercase(), symbol);
        Self::new(title, message, format!("stock-alert-{}-{}", symbol, kind))
    }

    /// Request for an alert pushed by the server
    pub fn from_alert(event: &AlertEvent) -> Self {
        use crate::bus::AlertCategory;

        match event.category {
            AlertCategory::StockAlert => {
                let mut request = Self::stock_alert(&event.symbol, &event.kind, &event.message);
                if !event.title.is_empty() {
                    request = Self::new(event.title.clone(), event.message.clone(), request.tag);
                }
                request
            }
            AlertCategory::ConnectionStatus => {
                Self::new(event.title.clone(), event.message.clone(), CONNECTION_STATUS_TAG)
            }
            AlertCategory::Generic => Self::new(
                event.title.clone(),
                event.message.clone(),
                format!("notification-{}", event.kind),
            ),
        }
    }
}

/// The notification a platform tag currently displays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    /// Dedup key of the shown request
    pub key: String,
    /// Time it was shown
    pub shown_at: Instant,
}

/// Work item for the gateway task
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayMessage {
    /// Alert received from the server
    Alert(AlertEvent),
    /// Connection status changed
    ConnectionStatus {
        /// Whether live data is flowing
        connected: bool,
    },
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Master switch; disabled gateways never show anything
    pub enabled: bool,
    /// Window in which a repeated dedup key is suppressed
    pub dedup_window: Duration,
    /// Delay before a shown notification is closed
    pub auto_dismiss: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dedup_window: Duration::from_secs(10),
            auto_dismiss: Duration::from_secs(10),
        }
    }
}
