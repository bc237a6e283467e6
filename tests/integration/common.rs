//! Shared test fixtures

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use live_quotes::bus::{BusEvent, Subscription, Topic, UpdateBus};
use live_quotes::connection::{
    ConnectionConfig, ConnectionManager, ConnectionState, Connector, ServerMessage, StateChange,
    TransportCommand, TransportEvent, TransportHandle, TransportLink,
};
use live_quotes::credentials::{CredentialStore, MemoryStorage, UserRef};
use live_quotes::notify::{GatewayInbox, GatewayMessage};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Server side of one mock transport
pub struct Remote {
    pub events: mpsc::Sender<TransportEvent>,
    pub commands: mpsc::UnboundedReceiver<TransportCommand>,
}

/// Connector that hands every opened transport to the test
#[derive(Default)]
pub struct MockConnector {
    remotes: Mutex<Vec<Remote>>,
}

impl MockConnector {
    pub fn attempts(&self) -> usize {
        self.remotes.lock().len()
    }

    pub fn events(&self, attempt: usize) -> mpsc::Sender<TransportEvent> {
        self.remotes.lock()[attempt].events.clone()
    }

    pub fn commands(&self, attempt: usize) -> Vec<TransportCommand> {
        let mut remotes = self.remotes.lock();
        let mut commands = Vec::new();
        while let Ok(cmd) = remotes[attempt].commands.try_recv() {
            commands.push(cmd);
        }
        commands
    }
}

impl Connector for MockConnector {
    fn connect(&self, _url: &str) -> TransportLink {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        self.remotes.lock().push(Remote {
            events: event_tx,
            commands: cmd_rx,
        });
        TransportLink {
            events: event_rx,
            handle: TransportHandle::new(cmd_tx),
        }
    }
}

/// JWT-shaped token whose `exp` is `secs` from now
pub fn token_expiring_in(secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + secs;
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{}}}"#, exp));
    format!("eyJhbGciOiJIUzI1NiJ9.{}.c2ln", payload)
}

pub fn user() -> UserRef {
    UserRef {
        id: "u1".to_string(),
        username: "kiran".to_string(),
        email: Some("kiran@example.com".to_string()),
    }
}

/// Let spawned tasks run without moving the clock
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// A manager wired to a mock connector, a memory store and a recording bus
pub struct Harness {
    pub manager: ConnectionManager,
    pub connector: Arc<MockConnector>,
    pub store: Arc<CredentialStore>,
    pub bus: UpdateBus,
    pub states: Arc<Mutex<Vec<StateChange>>>,
    notices: mpsc::UnboundedReceiver<GatewayMessage>,
    _subscription: Subscription,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ConnectionConfig::new("http://localhost:3001"))
    }

    pub fn with_config(config: ConnectionConfig) -> Self {
        let connector = Arc::new(MockConnector::default());
        let store = Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new())));
        store
            .set_credential(&token_expiring_in(3600), &user())
            .unwrap();

        let (inbox, notices) = GatewayInbox::channel();
        let bus = UpdateBus::with_alert_sink(Arc::new(inbox.clone()));
        let states = Arc::new(Mutex::new(Vec::new()));
        let recorded = states.clone();
        let subscription = bus.subscribe(Topic::ConnectionState, move |event| {
            if let BusEvent::State(change) = event {
                recorded.lock().push(change.clone());
            }
        });

        let manager = ConnectionManager::spawn(
            config,
            connector.clone(),
            store.clone(),
            bus.clone(),
            inbox,
        );

        Self {
            manager,
            connector,
            store,
            bus,
            states,
            notices,
            _subscription: subscription,
        }
    }

    pub async fn open(&self, attempt: usize) {
        let _ = self.connector.events(attempt).send(TransportEvent::Open).await;
        settle().await;
    }

    pub async fn message(&self, attempt: usize, message: ServerMessage) {
        let _ = self
            .connector
            .events(attempt)
            .send(TransportEvent::Message(message))
            .await;
        settle().await;
    }

    pub async fn authenticate(&self, attempt: usize) {
        self.message(attempt, ServerMessage::AuthSuccess { user: Some(user()) })
            .await;
    }

    pub async fn drop_transport(&self, attempt: usize) {
        let _ = self
            .connector
            .events(attempt)
            .send(TransportEvent::Closed {
                reason: "connection reset".to_string(),
            })
            .await;
        settle().await;
    }

    /// Connect and complete the handshake on a fresh attempt
    pub async fn connect_and_authenticate(&self) -> usize {
        self.manager.connect();
        settle().await;
        let attempt = self.connector.attempts() - 1;
        self.open(attempt).await;
        self.authenticate(attempt).await;
        assert_eq!(self.manager.state(), ConnectionState::Connected);
        attempt
    }

    pub fn state_sequence(&self) -> Vec<ConnectionState> {
        self.states.lock().iter().map(|c| c.current).collect()
    }

    pub fn last_change(&self) -> Option<StateChange> {
        self.states.lock().last().cloned()
    }

    pub fn drain_notices(&mut self) -> Vec<GatewayMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.notices.try_recv() {
            out.push(message);
        }
        out
    }
}
