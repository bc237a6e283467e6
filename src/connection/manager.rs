//! Connection manager: the async driver around [`ConnectionMachine`]
//!
//! One tokio task owns the machine, the current transport and both
//! deadlines. Callers talk to it through a command channel, so `connect()`
//! and `disconnect()` return immediately and every input is processed in
//! arrival order.

use super::machine::{Announcement, ConnectionMachine, Effect, Input};
use super::transport::{Connector, TransportEvent, TransportLink};
use super::types::{ConnectionConfig, ConnectionState};
use crate::bus::UpdateBus;
use crate::credentials::CredentialStore;
use crate::notify::GatewayInbox;
use crate::telemetry::{self, CounterMetric};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

enum Command {
    Connect,
    Disconnect { ack: Option<oneshot::Sender<()>> },
}

/// Handle to the connection driver task
///
/// Dropping the handle closes the command channel, which disconnects and
/// stops the driver.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Start the driver task; must be called inside a tokio runtime
    pub fn spawn(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        store: Arc<CredentialStore>,
        bus: UpdateBus,
        inbox: GatewayInbox,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let driver = Driver {
            machine: ConnectionMachine::new(&config),
            config,
            connector,
            store,
            bus,
            inbox,
            state_tx,
            link: None,
            transport_epoch: 0,
            handshake_deadline: None,
            retry_deadline: None,
        };
        let task = tokio::spawn(driver.run(cmd_rx));

        Self {
            commands: cmd_tx,
            state: state_rx,
            task,
        }
    }

    /// Request a connection using the stored credential
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Request a disconnect; idempotent
    pub fn disconnect(&self) {
        self.send(Command::Disconnect { ack: None });
    }

    /// Disconnect and wait until the driver has applied it
    pub async fn disconnect_and_wait(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Disconnect { ack: Some(ack_tx) });
        // Errors mean the driver is gone, which is disconnected too
        let _ = ack_rx.await;
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state the driver publishes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Whether the driver task is still alive
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Connection driver stopped, command dropped");
        }
    }
}

struct Driver {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    store: Arc<CredentialStore>,
    bus: UpdateBus,
    inbox: GatewayInbox,
    state_tx: watch::Sender<ConnectionState>,
    machine: ConnectionMachine,
    link: Option<TransportLink>,
    transport_epoch: u64,
    handshake_deadline: Option<(u64, Instant)>,
    retry_deadline: Option<(u64, Instant)>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!(url = %self.config.url, "Connection driver started");

        loop {
            let input = tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Connect) => Input::Connect {
                        token: self.store.usable_token(),
                    },
                    Some(Command::Disconnect { ack }) => {
                        self.apply(Input::Disconnect);
                        if let Some(ack) = ack {
                            let _ = ack.send(());
                        }
                        continue;
                    }
                    None => {
                        self.apply(Input::Disconnect);
                        break;
                    }
                },

                event = next_event(&mut self.link) => {
                    let epoch = self.transport_epoch;
                    match event {
                        Some(TransportEvent::Open) => Input::TransportOpen { epoch },
                        Some(TransportEvent::Message(message)) => {
                            Input::TransportMessage { epoch, message }
                        }
                        Some(TransportEvent::Closed { reason }) => {
                            self.link = None;
                            Input::TransportClosed { epoch, reason }
                        }
                        None => {
                            self.link = None;
                            Input::TransportClosed {
                                epoch,
                                reason: "transport ended".to_string(),
                            }
                        }
                    }
                }

                _ = wait_until(self.handshake_deadline) => {
                    let epoch = self.handshake_deadline.take().map_or(0, |(epoch, _)| epoch);
                    Input::HandshakeTimeout { epoch }
                }

                _ = wait_until(self.retry_deadline) => {
                    let epoch = self.retry_deadline.take().map_or(0, |(epoch, _)| epoch);
                    Input::RetryDue {
                        epoch,
                        token: self.store.usable_token(),
                    }
                }
            };

            self.apply(input);
        }

        tracing::debug!("Connection driver stopped");
    }

    fn apply(&mut self, input: Input) {
        for effect in self.machine.handle(input) {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Open { epoch } => {
                if let Some(old) = self.link.take() {
                    old.handle.close();
                }
                self.link = Some(self.connector.connect(&self.config.url));
                self.transport_epoch = epoch;
            }
            Effect::SendAuth { token } => match &self.link {
                Some(link) => link.handle.emit("auth", json!({ "token": token })),
                None => tracing::warn!("No transport to authenticate on"),
            },
            Effect::Close => {
                if let Some(link) = self.link.take() {
                    link.handle.close();
                }
            }
            Effect::StartHandshakeTimer { epoch, after } => {
                self.handshake_deadline = Some((epoch, Instant::now() + after));
            }
            Effect::CancelHandshakeTimer => self.handshake_deadline = None,
            Effect::ScheduleRetry { epoch, after } => {
                telemetry::increment(CounterMetric::ReconnectAttempts);
                self.retry_deadline = Some((epoch, Instant::now() + after));
            }
            Effect::CancelRetry => self.retry_deadline = None,
            Effect::State(change) => {
                match &change.error {
                    Some(err) => tracing::warn!(
                        from = %change.previous,
                        to = %change.current,
                        attempt = change.attempt,
                        error = %err,
                        "Connection state changed"
                    ),
                    None => tracing::info!(
                        from = %change.previous,
                        to = %change.current,
                        attempt = change.attempt,
                        "Connection state changed"
                    ),
                }
                telemetry::record_state(change.current);
                self.state_tx.send_replace(change.current);
                self.bus.publish_state(change);
            }
            Effect::Ticks(batch) => self.bus.publish_ticks(batch),
            Effect::Alert(event) => self.bus.publish_alert(event),
            Effect::Announce(status) => self
                .inbox
                .connection_status(status == Announcement::Connected),
            Effect::ClearCredential => self.store.clear(),
        }
    }
}

async fn next_event(link: &mut Option<TransportLink>) -> Option<TransportEvent> {
    match link {
        Some(link) => link.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<(u64, Instant)>) {
    match deadline {
        Some((_, at)) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
