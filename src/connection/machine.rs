//! Connection state machine
//!
//! A pure transition function: [`ConnectionMachine::handle`] consumes one
//! [`Input`] and returns the [`Effect`]s the driver must carry out, in order.
//! It never touches the network or the clock, so every path can be tested
//! without either.
//!
//! Every transport and every timer is tagged with the epoch that was current
//! when it was created. Starting an attempt, scheduling a retry and
//! disconnecting all advance the epoch, so anything arriving from a
//! superseded transport or timer is ignored.

use super::protocol::ServerMessage;
use super::reconnect::RetryPolicy;
use super::types::{ConnectionConfig, ConnectionError, ConnectionState, StateChange};
use crate::bus::{AlertEvent, Tick};
use std::collections::VecDeque;
use std::time::Duration;

/// Connection status announced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    /// Live data is flowing
    Connected,
    /// Live data stopped
    Disconnected,
}

/// Something that happened
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Caller asked to connect; `token` is `None` when no usable credential exists
    Connect {
        /// Bearer token to authenticate with
        token: Option<String>,
    },
    /// Caller asked to disconnect
    Disconnect,
    /// Transport reports the channel is open
    TransportOpen {
        /// Epoch of the transport
        epoch: u64,
    },
    /// Transport delivered an application message
    TransportMessage {
        /// Epoch of the transport
        epoch: u64,
        /// Decoded message
        message: ServerMessage,
    },
    /// Transport closed
    TransportClosed {
        /// Epoch of the transport
        epoch: u64,
        /// Close reason
        reason: String,
    },
    /// Handshake deadline passed
    HandshakeTimeout {
        /// Epoch of the attempt the deadline belongs to
        epoch: u64,
    },
    /// Retry delay elapsed; the driver re-reads the credential
    RetryDue {
        /// Epoch the retry was scheduled under
        epoch: u64,
        /// Bearer token, `None` if the credential is gone
        token: Option<String>,
    },
}

/// Something the driver must do
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a new transport tagged with `epoch`, dropping any current one
    Open {
        /// Epoch for the new transport
        epoch: u64,
    },
    /// Send the `auth` message on the current transport
    SendAuth {
        /// Bearer token
        token: String,
    },
    /// Drop the current transport
    Close,
    /// Arm the handshake deadline
    StartHandshakeTimer {
        /// Epoch the deadline belongs to
        epoch: u64,
        /// Time until the deadline
        after: Duration,
    },
    /// Disarm the handshake deadline
    CancelHandshakeTimer,
    /// Arm the retry timer
    ScheduleRetry {
        /// Epoch the retry belongs to
        epoch: u64,
        /// Delay before retrying
        after: Duration,
    },
    /// Disarm the retry timer
    CancelRetry,
    /// Publish a state transition
    State(StateChange),
    /// Publish a tick batch
    Ticks(Vec<Tick>),
    /// Publish an alert
    Alert(AlertEvent),
    /// Show a connection status notification
    Announce(Announcement),
    /// Discard the stored credential
    ClearCredential,
}

/// Finite-state machine for the authenticated live connection
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    epoch: u64,
    token: Option<String>,
    policy: RetryPolicy,
    in_retry_cycle: bool,
    handshake_timeout: Duration,
    buffer: VecDeque<ServerMessage>,
    buffer_capacity: usize,
    announced: Option<Announcement>,
    last_error: Option<ConnectionError>,
}

impl ConnectionMachine {
    /// Create a machine in the Disconnected state
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            epoch: 0,
            token: None,
            policy: RetryPolicy::new(config.reconnect_delay, config.max_reconnect_attempts),
            in_retry_cycle: false,
            handshake_timeout: config.handshake_timeout,
            buffer: VecDeque::new(),
            buffer_capacity: config.buffer_capacity,
            announced: None,
            last_error: None,
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Most recent failure, cleared on successful connect
    pub fn last_error(&self) -> Option<&ConnectionError> {
        self.last_error.as_ref()
    }

    /// Apply one input
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let mut effects = Vec::new();
        match input {
            Input::Connect { token } => self.on_connect(token, &mut effects),
            Input::Disconnect => self.on_disconnect(&mut effects),
            Input::TransportOpen { epoch } => {
                if self.is_current(epoch) && self.state == ConnectionState::Connecting {
                    self.transition(ConnectionState::Authenticating, None, &mut effects);
                    if let Some(token) = self.token.clone() {
                        effects.push(Effect::SendAuth { token });
                    }
                }
            }
            Input::TransportMessage { epoch, message } => {
                if self.is_current(epoch) {
                    self.on_message(message, &mut effects);
                }
            }
            Input::TransportClosed { epoch, reason } => {
                if self.is_current(epoch) {
                    self.on_transport_lost(reason, &mut effects);
                }
            }
            Input::HandshakeTimeout { epoch } => {
                if self.is_current(epoch)
                    && matches!(
                        self.state,
                        ConnectionState::Connecting | ConnectionState::Authenticating
                    )
                {
                    effects.push(Effect::Close);
                    self.buffer.clear();
                    let err = ConnectionError::HandshakeTimeout(self.handshake_timeout);
                    self.attempt_failed(err, &mut effects);
                }
            }
            Input::RetryDue { epoch, token } => {
                if self.is_current(epoch) && self.state == ConnectionState::Reconnecting {
                    match token {
                        Some(token) => self.begin_attempt(token, &mut effects),
                        None => {
                            tracing::warn!("Credential gone before retry, stopping reconnection");
                            self.in_retry_cycle = false;
                            self.policy.reset();
                            self.transition(ConnectionState::Disconnected, None, &mut effects);
                        }
                    }
                }
            }
        }
        effects
    }

    fn is_current(&self, epoch: u64) -> bool {
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, "Ignoring stale event");
            return false;
        }
        true
    }

    fn on_connect(&mut self, token: Option<String>, effects: &mut Vec<Effect>) {
        match self.state {
            ConnectionState::Connecting
            | ConnectionState::Authenticating
            | ConnectionState::Connected => {
                tracing::debug!(state = %self.state, "Connect ignored, already active");
            }
            ConnectionState::Disconnected
            | ConnectionState::Errored
            | ConnectionState::Reconnecting => {
                let Some(token) = token else {
                    tracing::warn!(state = %self.state, "No usable credential, not connecting");
                    return;
                };
                if self.state == ConnectionState::Reconnecting {
                    effects.push(Effect::CancelRetry);
                }
                self.in_retry_cycle = false;
                self.policy.reset();
                self.begin_attempt(token, effects);
            }
        }
    }

    fn on_disconnect(&mut self, effects: &mut Vec<Effect>) {
        self.epoch += 1;
        effects.push(Effect::CancelHandshakeTimer);
        effects.push(Effect::CancelRetry);
        effects.push(Effect::Close);
        self.buffer.clear();
        self.in_retry_cycle = false;
        self.policy.reset();

        if self.state != ConnectionState::Disconnected {
            let was_connected = self.state == ConnectionState::Connected;
            self.transition(ConnectionState::Disconnected, None, effects);
            if was_connected {
                self.announce(Announcement::Disconnected, effects);
            }
        }
    }

    fn on_message(&mut self, message: ServerMessage, effects: &mut Vec<Effect>) {
        match (self.state, message) {
            (ConnectionState::Authenticating, ServerMessage::AuthSuccess { user }) => {
                if let Some(user) = user {
                    tracing::info!(user = %user.username, "Authenticated");
                }
                self.enter_connected(effects);
            }
            (ConnectionState::Authenticating, ServerMessage::AuthError { message }) => {
                tracing::warn!(reason = %message, "Server rejected credential");
                effects.push(Effect::CancelHandshakeTimer);
                effects.push(Effect::Close);
                effects.push(Effect::ClearCredential);
                self.buffer.clear();
                self.token = None;
                self.in_retry_cycle = false;
                self.policy.reset();
                self.epoch += 1;
                self.transition(
                    ConnectionState::Errored,
                    Some(ConnectionError::AuthRejected(message)),
                    effects,
                );
            }
            (ConnectionState::Authenticating, message) if message.is_data() => {
                if self.buffer.len() >= self.buffer_capacity {
                    tracing::warn!(
                        capacity = self.buffer_capacity,
                        "Pre-auth buffer full, dropping oldest message"
                    );
                    self.buffer.pop_front();
                }
                if self.buffer_capacity > 0 {
                    self.buffer.push_back(message);
                }
            }
            (ConnectionState::Connected, message) => Self::relay(message, effects),
            (state, message) => {
                tracing::debug!(%state, ?message, "Ignoring message");
            }
        }
    }

    fn relay(message: ServerMessage, effects: &mut Vec<Effect>) {
        match message {
            ServerMessage::StockUpdate(batch) => effects.push(Effect::Ticks(batch)),
            ServerMessage::Notification(alert) => effects.push(Effect::Alert(alert)),
            ServerMessage::AuthSuccess { .. } | ServerMessage::AuthError { .. } => {
                tracing::debug!("Ignoring auth message on established connection");
            }
            ServerMessage::Unknown(name) => tracing::debug!(event = %name, "Unhandled event"),
        }
    }

    fn on_transport_lost(&mut self, reason: String, effects: &mut Vec<Effect>) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Authenticating => {
                effects.push(Effect::CancelHandshakeTimer);
                effects.push(Effect::Close);
                self.buffer.clear();
                self.attempt_failed(ConnectionError::Transport(reason), effects);
            }
            ConnectionState::Connected => {
                tracing::warn!(reason = %reason, "Connection lost");
                effects.push(Effect::Close);
                self.in_retry_cycle = true;
                self.policy.reset();
                self.schedule_retry(ConnectionError::Transport(reason), effects);
            }
            _ => {}
        }
    }

    fn begin_attempt(&mut self, token: String, effects: &mut Vec<Effect>) {
        self.epoch += 1;
        self.token = Some(token);
        self.buffer.clear();
        self.transition(ConnectionState::Connecting, None, effects);
        effects.push(Effect::Open { epoch: self.epoch });
        effects.push(Effect::StartHandshakeTimer {
            epoch: self.epoch,
            after: self.handshake_timeout,
        });
    }

    fn enter_connected(&mut self, effects: &mut Vec<Effect>) {
        effects.push(Effect::CancelHandshakeTimer);
        self.policy.reset();
        self.in_retry_cycle = false;
        self.last_error = None;
        self.transition(ConnectionState::Connected, None, effects);
        self.announce(Announcement::Connected, effects);
        for message in self.buffer.drain(..) {
            Self::relay(message, effects);
        }
    }

    fn attempt_failed(&mut self, err: ConnectionError, effects: &mut Vec<Effect>) {
        if self.in_retry_cycle {
            self.schedule_retry(err, effects);
        } else {
            self.epoch += 1;
            self.transition(ConnectionState::Errored, Some(err), effects);
        }
    }

    fn schedule_retry(&mut self, err: ConnectionError, effects: &mut Vec<Effect>) {
        let was_connected = self.state == ConnectionState::Connected;
        self.epoch += 1;
        match self.policy.next_delay() {
            Some(after) => {
                tracing::info!(
                    attempt = self.policy.attempt(),
                    max = self.policy.max_attempts(),
                    error = %err,
                    "Scheduling reconnect"
                );
                self.transition(ConnectionState::Reconnecting, Some(err), effects);
                effects.push(Effect::ScheduleRetry {
                    epoch: self.epoch,
                    after,
                });
            }
            None => {
                let attempts = self.policy.attempt();
                self.in_retry_cycle = false;
                self.policy.reset();
                let next = if self.state.can_transition_to(ConnectionState::Errored) {
                    ConnectionState::Errored
                } else {
                    // Zero retry budget: leave Connected through Reconnecting
                    self.transition(ConnectionState::Reconnecting, Some(err), effects);
                    ConnectionState::Errored
                };
                self.transition(
                    next,
                    Some(ConnectionError::RetryBudgetExhausted { attempts }),
                    effects,
                );
            }
        }
        if was_connected {
            self.announce(Announcement::Disconnected, effects);
        }
    }

    fn announce(&mut self, status: Announcement, effects: &mut Vec<Effect>) {
        let should = match status {
            Announcement::Connected => self.announced != Some(Announcement::Connected),
            Announcement::Disconnected => self.announced == Some(Announcement::Connected),
        };
        if should {
            self.announced = Some(status);
            effects.push(Effect::Announce(status));
        }
    }

    fn transition(
        &mut self,
        next: ConnectionState,
        error: Option<ConnectionError>,
        effects: &mut Vec<Effect>,
    ) {
        let previous = self.state;
        debug_assert!(
            previous.can_transition_to(next),
            "illegal transition {} -> {}",
            previous,
            next
        );
        if let Some(err) = &error {
            self.last_error = Some(err.clone());
        }
        self.state = next;
        let attempt = if self.in_retry_cycle {
            self.policy.attempt()
        } else {
            0
        };
        effects.push(Effect::State(StateChange {
            previous,
            current: next,
            error,
            attempt,
        }));
    }
}
