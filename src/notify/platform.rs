//! Notification platforms
//!
//! A platform is whatever actually puts a banner in front of the user. The
//! gateway only talks to the [`NotificationPlatform`] trait.

use super::types::{Notification, NotificationId, Permission};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

/// Platform failures
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Notifications are not available here
    #[error("Notifications are not supported on this platform")]
    Unsupported,
    /// The platform refused to show the notification
    #[error("Failed to show notification: {0}")]
    ShowFailed(String),
}

/// Something that can display notifications
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    /// Whether notifications can be shown at all
    fn is_supported(&self) -> bool;

    /// Current permission
    fn permission(&self) -> Permission;

    /// Ask the user for permission
    async fn request_permission(&self) -> Permission;

    /// Display a notification
    fn show(&self, notification: &Notification) -> Result<(), PlatformError>;

    /// Dismiss a notification if it is still visible
    fn close(&self, id: NotificationId);
}

/// Terminal banners written through the log
///
/// Notifications sharing a tag replace each other, so at most one banner per
/// tag is live at a time.
#[derive(Debug, Default)]
pub struct ConsolePlatform {
    live: Mutex<HashMap<String, NotificationId>>,
}

impl ConsolePlatform {
    /// Create a console platform
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of banners currently live
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

#[async_trait]
impl NotificationPlatform for ConsolePlatform {
    fn is_supported(&self) -> bool {
        true
    }

    fn permission(&self) -> Permission {
        Permission::Granted
    }

    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn show(&self, notification: &Notification) -> Result<(), PlatformError> {
        let replaced = self
            .live
            .lock()
            .insert(notification.tag.clone(), notification.id);
        if let Some(old) = replaced {
            tracing::debug!(%old, tag = %notification.tag, "Replacing notification");
        }
        tracing::info!(
            target: "notification",
            id = %notification.id,
            tag = %notification.tag,
            "{}: {}",
            notification.title,
            notification.body
        );
        Ok(())
    }

    fn close(&self, id: NotificationId) {
        self.live.lock().retain(|_, live| *live != id);
    }
}

/// Platform without notification support
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPlatform;

#[async_trait]
impl NotificationPlatform for UnsupportedPlatform {
    fn is_supported(&self) -> bool {
        false
    }

    fn permission(&self) -> Permission {
        Permission::Denied
    }

    async fn request_permission(&self) -> Permission {
        Permission::Denied
    }

    fn show(&self, _notification: &Notification) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn close(&self, _id: NotificationId) {}
}
