//! Notification gateway and its inbox task

use super::platform::NotificationPlatform;
use super::types::{
    GatewayConfig, GatewayMessage, Notification, NotificationId, NotificationRecord,
    NotifyRequest, Permission,
};
use crate::bus::{AlertEvent, AlertSink};
use crate::telemetry::{self, CounterMetric};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Permission handling, de-duplication and auto-dismiss in front of a platform
pub struct NotificationGateway {
    platform: Arc<dyn NotificationPlatform>,
    config: GatewayConfig,
    permission: Mutex<Permission>,
    permission_requested: AtomicBool,
    interacted: AtomicBool,
    /// Last notification shown per platform tag
    recent: Mutex<HashMap<String, NotificationRecord>>,
}

impl NotificationGateway {
    /// Create a gateway, reading the initial permission from the platform
    pub fn new(platform: Arc<dyn NotificationPlatform>, config: GatewayConfig) -> Self {
        let permission = platform.permission();
        Self {
            platform,
            config,
            permission: Mutex::new(permission),
            permission_requested: AtomicBool::new(false),
            interacted: AtomicBool::new(false),
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the platform can show notifications
    pub fn is_supported(&self) -> bool {
        self.platform.is_supported()
    }

    /// Cached permission
    pub fn permission(&self) -> Permission {
        *self.permission.lock()
    }

    /// Record a user interaction; the first one asks for permission
    pub async fn on_user_interaction(&self) -> Permission {
        if self.interacted.swap(true, Ordering::SeqCst) {
            return self.permission();
        }
        self.ensure_permission().await
    }

    /// Ask for permission at most once per gateway
    async fn ensure_permission(&self) -> Permission {
        let current = self.permission();
        if current != Permission::Default || !self.is_supported() {
            return current;
        }
        if self.permission_requested.swap(true, Ordering::SeqCst) {
            return current;
        }

        let granted = self.platform.request_permission().await;
        tracing::info!(permission = ?granted, "Notification permission resolved");
        *self.permission.lock() = granted;
        granted
    }

    /// Show a notification unless unsupported, refused or a recent duplicate
    ///
    /// Returns whether the platform was asked to show it. Auto-dismiss is
    /// only scheduled when called inside a tokio runtime.
    pub async fn notify(&self, request: NotifyRequest) -> bool {
        if !self.config.enabled || !self.is_supported() {
            return false;
        }
        if self.ensure_permission().await != Permission::Granted {
            tracing::debug!(tag = %request.tag, "Notification permission not granted");
            return false;
        }

        let now = Instant::now();
        {
            let mut recent = self.recent.lock();
            let window = self.config.dedup_window;
            recent.retain(|_, record| now.duration_since(record.shown_at) < window);
            // Only a repeat of what the tag currently displays is a duplicate
            let repeat = recent
                .get(&request.tag)
                .is_some_and(|record| record.key == request.dedup_key);
            if repeat {
                tracing::debug!(key = %request.dedup_key, "Suppressing duplicate notification");
                telemetry::increment(CounterMetric::NotificationsSuppressed);
                return false;
            }
        }

        let notification = Notification {
            id: NotificationId::new(),
            title: request.title,
            body: request.body,
            tag: request.tag,
        };
        if let Err(e) = self.platform.show(&notification) {
            tracing::warn!(error = %e, tag = %notification.tag, "Failed to show notification");
            return false;
        }

        self.recent.lock().insert(
            notification.tag.clone(),
            NotificationRecord {
                key: request.dedup_key,
                shown_at: now,
            },
        );
        telemetry::increment(CounterMetric::NotificationsShown);
        self.schedule_dismiss(notification.id);
        true
    }

    fn schedule_dismiss(&self, id: NotificationId) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let platform = Arc::clone(&self.platform);
        let delay = self.config.auto_dismiss;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            platform.close(id);
        });
    }

    /// Price alert for a symbol
    pub async fn show_stock_alert(&self, symbol: &str, kind: &str, message: &str) -> bool {
        self.notify(NotifyRequest::stock_alert(symbol, kind, message))
            .await
    }

    /// Connection status banner
    pub async fn show_connection_status(&self, connected: bool) -> bool {
        self.notify(NotifyRequest::connection_status(connected)).await
    }

    /// Alert pushed by the server
    pub async fn show_alert(&self, event: &AlertEvent) -> bool {
        self.notify(NotifyRequest::from_alert(event)).await
    }

    /// Handle one inbox message
    pub async fn handle(&self, message: GatewayMessage) -> bool {
        match message {
            GatewayMessage::Alert(event) => self.show_alert(&event).await,
            GatewayMessage::ConnectionStatus { connected } => {
                self.show_connection_status(connected).await
            }
        }
    }
}

/// Sending side of the gateway task
///
/// Posting never blocks, so the connection driver and the bus can hand off
/// notifications without waiting on permission prompts.
#[derive(Debug, Clone)]
pub struct GatewayInbox {
    tx: mpsc::UnboundedSender<GatewayMessage>,
}

impl GatewayInbox {
    /// Create an inbox and the receiver the gateway task reads from
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GatewayMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Post a connection status change
    pub fn connection_status(&self, connected: bool) {
        self.post(GatewayMessage::ConnectionStatus { connected });
    }

    /// Post a server alert
    pub fn alert(&self, event: AlertEvent) {
        self.post(GatewayMessage::Alert(event));
    }

    fn post(&self, message: GatewayMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!("Notification gateway stopped, dropping message");
        }
    }
}

impl AlertSink for GatewayInbox {
    fn forward(&self, event: &AlertEvent) {
        self.alert(event.clone());
    }
}

/// Process inbox messages in order until every sender is gone
pub async fn run_inbox(
    gateway: Arc<NotificationGateway>,
    mut rx: mpsc::UnboundedReceiver<GatewayMessage>,
) {
    while let Some(message) = rx.recv().await {
        gateway.handle(message).await;
    }
    tracing::debug!("Notification inbox closed");
}

/// Spawn the gateway task
pub fn spawn_inbox(gateway: Arc<NotificationGateway>) -> (GatewayInbox, JoinHandle<()>) {
    let (inbox, rx) = GatewayInbox::channel();
    let task = tokio::spawn(run_inbox(gateway, rx));
    (inbox, task)
}
