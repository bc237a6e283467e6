//! User-facing notifications
//!
//! The gateway sits between event producers and a notification platform. It
//! asks for permission once, drops repeats inside a dedup window and closes
//! what it showed after a fixed delay. Producers post to a [`GatewayInbox`];
//! a single task drains it so notifications appear in event order.

mod gateway;
mod platform;
mod types;

pub use gateway::{run_inbox, spawn_inbox, GatewayInbox, NotificationGateway};
pub use platform::{ConsolePlatform, NotificationPlatform, PlatformError, UnsupportedPlatform};
pub use types::{
    GatewayConfig, GatewayMessage, Notification, NotificationId, NotificationRecord,
    NotifyRequest, Permission, CONNECTION_STATUS_TAG,
};
