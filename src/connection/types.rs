//! Connection types and configuration

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Lifecycle state of the live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Idle; initial state and the result of `disconnect()`
    #[default]
    Disconnected,
    /// Transport is being opened
    Connecting,
    /// Transport is open and the `auth` message has been sent
    Authenticating,
    /// Authenticated; data messages are trusted
    Connected,
    /// Waiting to retry after losing an established connection
    Reconnecting,
    /// Gave up; requires an explicit `connect()`
    Errored,
}

impl ConnectionState {
    /// All states, in declaration order
    pub const ALL: [ConnectionState; 6] = [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Authenticating,
        ConnectionState::Connected,
        ConnectionState::Reconnecting,
        ConnectionState::Errored,
    ];

    /// Whether `next` is a legal successor of this state
    ///
    /// Connecting and Authenticating may fall back to Reconnecting only
    /// while a reconnect cycle is running; the machine enforces that part.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Authenticating | Errored | Disconnected | Reconnecting)
                | (Authenticating, Connected | Errored | Disconnected | Reconnecting)
                | (Connected, Reconnecting | Disconnected)
                | (Reconnecting, Connecting | Disconnected | Errored)
                | (Errored, Disconnected | Connecting)
        )
    }

    /// Whether a connection attempt is in flight or established
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Authenticating
                | ConnectionState::Connected
        )
    }

    /// Stable lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Errored => "errored",
        }
    }

    /// Numeric code used for the state gauge
    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection failures surfaced through state changes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Socket-level failure
    #[error("Transport error: {0}")]
    Transport(String),
    /// Server refused the token
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),
    /// No definitive handshake result in time
    #[error("No handshake response within {0:?}")]
    HandshakeTimeout(Duration),
    /// Automatic reconnection gave up
    #[error("Gave up after {attempts} reconnect attempts")]
    RetryBudgetExhausted {
        /// Attempts made in the failed cycle
        attempts: u32,
    },
}

/// One observed state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// State before the transition
    pub previous: ConnectionState,
    /// State after the transition
    pub current: ConnectionState,
    /// Failure that caused the transition, if any
    pub error: Option<ConnectionError>,
    /// Reconnect attempt number within the current cycle (0 outside one)
    pub attempt: u32,
}

/// Connection manager configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server base URL (http, https, ws or wss)
    pub url: String,
    /// Time allowed from opening the transport to `auth_success`
    pub handshake_timeout: Duration,
    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Fixed delay before each reconnect attempt
    pub reconnect_delay: Duration,
    /// Data messages held while authenticating
    pub buffer_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            handshake_timeout: Duration::from_secs(10),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            buffer_capacity: 64,
        }
    }
}

impl ConnectionConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the handshake timeout
    pub fn handshake_timeout(mut self, d: Duration) -> Self {
        self.handshake_timeout = d;
        self
    }

    /// Set maximum reconnection attempts
    pub fn max_reconnects(mut self, n: u32) -> Self {
        self.max_reconnect_attempts = n;
        self
    }

    /// Set the delay between reconnection attempts
    pub fn reconnect_delay(mut self, d: Duration) -> Self {
        self.reconnect_delay = d;
        self
    }

    /// Set the authentication buffer capacity
    pub fn buffer_capacity(mut self, n: usize) -> Self {
        self.buffer_capacity = n;
        self
    }
}
