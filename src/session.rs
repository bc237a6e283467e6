//! Session wiring
//!
//! Builds the credential store, notification gateway, update bus, REST client
//! and connection manager once and connects them: alerts flow from the bus
//! into the gateway inbox, and a 401 from any REST call disconnects the live
//! channel.

use crate::api::{ApiClient, ApiError};
use crate::bus::UpdateBus;
use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionState, Connector, WsConnector};
use crate::credentials::{CredentialStore, FileStorage, KeyValueStorage, UserRef};
use crate::notify::{
    spawn_inbox, ConsolePlatform, NotificationGateway, NotificationPlatform, Permission,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// A running client session
pub struct Session {
    store: Arc<CredentialStore>,
    api: Arc<ApiClient>,
    bus: UpdateBus,
    gateway: Arc<NotificationGateway>,
    manager: Arc<ConnectionManager>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Start a session with injected collaborators; must run inside a tokio runtime
    pub fn start(
        config: &Config,
        storage: Arc<dyn KeyValueStorage>,
        platform: Arc<dyn NotificationPlatform>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ApiError> {
        let store = Arc::new(
            CredentialStore::new(storage)
                .with_validity(chrono::Duration::hours(config.session.validity_hours)),
        );
        let api = Arc::new(ApiClient::new(&config.server, Arc::clone(&store))?);

        let gateway = Arc::new(NotificationGateway::new(
            platform,
            config.notifications.to_gateway_config(),
        ));
        let (inbox, inbox_task) = spawn_inbox(Arc::clone(&gateway));
        let bus = UpdateBus::with_alert_sink(Arc::new(inbox.clone()));

        let manager = Arc::new(ConnectionManager::spawn(
            config
                .connection
                .to_connection_config(&config.server.base_url),
            connector,
            Arc::clone(&store),
            bus.clone(),
            inbox,
        ));

        let watcher = spawn_unauthorized_watcher(&api, Arc::clone(&manager));

        Ok(Self {
            store,
            api,
            bus,
            gateway,
            manager,
            tasks: vec![inbox_task, watcher],
        })
    }

    /// Start a session with file storage, console notifications and a websocket transport
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::start(
            config,
            Arc::new(FileStorage::new(config.session.storage_path.clone())),
            Arc::new(ConsolePlatform::new()),
            Arc::new(WsConnector::new()),
        )
    }

    /// Log in, store the credential and open the live connection
    pub async fn login(&self, email: &str, password: &str) -> Result<UserRef, ApiError> {
        let user = self.api.login(email, password).await?;
        self.manager.connect();
        Ok(user)
    }

    /// Close the live connection, then forget the credential
    pub async fn logout(&self) {
        self.manager.disconnect_and_wait().await;
        self.store.clear();
        tracing::info!("Logged out");
    }

    /// Connect with the stored credential
    pub fn connect(&self) {
        self.manager.connect();
    }

    /// Drop the live connection
    pub fn disconnect(&self) {
        self.manager.disconnect();
    }

    /// Forward a user interaction to the gateway
    pub async fn on_user_interaction(&self) -> Permission {
        self.gateway.on_user_interaction().await
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Bus carrying ticks, alerts and connection state
    pub fn bus(&self) -> &UpdateBus {
        &self.bus
    }

    /// REST client sharing this session's credential store
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Credential store read by the API client and the connection
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Gateway that turns alerts and status changes into desktop notifications
    pub fn gateway(&self) -> &NotificationGateway {
        &self.gateway
    }

    /// Connection manager driving the quote socket
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn spawn_unauthorized_watcher(api: &ApiClient, manager: Arc<ConnectionManager>) -> JoinHandle<()> {
    let mut rx = api.subscribe_unauthorized();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    tracing::info!("Session rejected by server, disconnecting");
                    manager.disconnect();
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
