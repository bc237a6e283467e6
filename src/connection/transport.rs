//! Transport seam and the websocket implementation
//!
//! A [`Connector`] opens one transport per connection attempt and hands back
//! a [`TransportLink`]: a receiver of [`TransportEvent`]s and a
//! [`TransportHandle`] for emitting events or closing. Transports never
//! reconnect on their own; retrying is the connection manager's job.

use super::protocol::{
    decode_packet, encode_event, socket_url, EnginePacket, ProtocolError, ServerMessage,
    SocketPacket, CONNECT_PACKET, PONG_PACKET,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Liveness window used until the server announces its ping settings
const DEFAULT_LIVENESS: Duration = Duration::from_secs(45);

/// Transport failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish or keep the socket
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Failed to write a frame
    #[error("Send failed: {0}")]
    SendFailed(String),
    /// Server refused the namespace connection
    #[error("Connection refused by server: {0}")]
    Refused(String),
    /// Server closed the session
    #[error("Server closed the connection")]
    ServerClosed,
    /// No heartbeat within the negotiated window
    #[error("Heartbeat timeout")]
    HeartbeatTimeout,
    /// URL or framing problem
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Event reported by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Channel established and ready for application messages
    Open,
    /// Application message from the server
    Message(ServerMessage),
    /// Channel closed or failed
    Closed {
        /// Human-readable cause
        reason: String,
    },
}

/// Command sent to a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    /// Emit a named event
    Emit {
        /// Event name
        event: String,
        /// Event argument
        data: Value,
    },
    /// Close the channel
    Close,
}

/// Write side of an open transport
#[derive(Debug, Clone)]
pub struct TransportHandle {
    tx: mpsc::UnboundedSender<TransportCommand>,
}

impl TransportHandle {
    /// Wrap a command sender
    pub fn new(tx: mpsc::UnboundedSender<TransportCommand>) -> Self {
        Self { tx }
    }

    /// Emit a named event; silently dropped if the transport is gone
    pub fn emit(&self, event: &str, data: Value) {
        let _ = self.tx.send(TransportCommand::Emit {
            event: event.to_string(),
            data,
        });
    }

    /// Ask the transport to close
    pub fn close(&self) {
        let _ = self.tx.send(TransportCommand::Close);
    }
}

/// Both halves of an opened transport
#[derive(Debug)]
pub struct TransportLink {
    /// Events from the transport
    pub events: mpsc::Receiver<TransportEvent>,
    /// Commands to the transport
    pub handle: TransportHandle,
}

/// Opens transports
pub trait Connector: Send + Sync {
    /// Start opening a transport to `url`; progress is reported on the link
    fn connect(&self, url: &str) -> TransportLink;
}

/// Socket.IO over websocket
#[derive(Debug, Clone)]
pub struct WsConnector {
    channel_capacity: usize,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

impl WsConnector {
    /// Create a connector with the default event channel size
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> TransportLink {
        let (event_tx, event_rx) = mpsc::channel(self.channel_capacity);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let url = url.to_string();

        tokio::spawn(async move {
            let reason = match run_session(&url, &event_tx, cmd_rx).await {
                Ok(()) => "closed by client".to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, "Quote socket closed");
                    e.to_string()
                }
            };
            let _ = event_tx.send(TransportEvent::Closed { reason }).await;
        });

        TransportLink {
            events: event_rx,
            handle: TransportHandle::new(cmd_tx),
        }
    }
}

/// Drive one websocket session until it ends
async fn run_session(
    url: &str,
    events: &mpsc::Sender<TransportEvent>,
    mut commands: mpsc::UnboundedReceiver<TransportCommand>,
) -> Result<(), TransportError> {
    let ws_url = socket_url(url)?;
    tracing::info!(url = %ws_url, "Connecting to quote server");

    // A close requested while dialing ends the session before the socket opens
    let mut pending = Vec::new();
    let dial = connect_async(ws_url.as_str());
    tokio::pin!(dial);
    let ws_stream = loop {
        tokio::select! {
            result = &mut dial => {
                let (stream, _response) =
                    result.map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
                break stream;
            }
            cmd = commands.recv() => match cmd {
                Some(TransportCommand::Emit { event, data }) => pending.push((event, data)),
                Some(TransportCommand::Close) | None => {
                    tracing::debug!("Close requested while dialing");
                    return Ok(());
                }
            }
        }
    };
    let (mut write, mut read) = ws_stream.split();
    for (event, data) in pending {
        write
            .send(Message::Text(encode_event(&event, &data)))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    }

    let mut liveness_window = DEFAULT_LIVENESS;
    let mut deadline = Instant::now() + liveness_window;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match decode_packet(&text) {
                            Ok(EnginePacket::Open(info)) => {
                                tracing::debug!(sid = %info.sid, "Engine session opened");
                                liveness_window =
                                    Duration::from_millis(info.ping_interval + info.ping_timeout);
                                deadline = Instant::now() + liveness_window;
                                write.send(Message::Text(CONNECT_PACKET.to_string())).await
                                    .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                            }
                            Ok(EnginePacket::Ping(payload)) => {
                                deadline = Instant::now() + liveness_window;
                                write.send(Message::Text(format!("{}{}", PONG_PACKET, payload))).await
                                    .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                            }
                            Ok(EnginePacket::Close) => return Err(TransportError::ServerClosed),
                            Ok(EnginePacket::Message(packet)) => match packet {
                                SocketPacket::Connect(_) => {
                                    if events.send(TransportEvent::Open).await.is_err() {
                                        return Ok(());
                                    }
                                }
                                SocketPacket::Event { name, data } => {
                                    match ServerMessage::from_event(&name, data) {
                                        Ok(message) => {
                                            if events.send(TransportEvent::Message(message)).await.is_err() {
                                                tracing::debug!("Receiver dropped, closing connection");
                                                return Ok(());
                                            }
                                        }
                                        Err(e) => {
                                            tracing::warn!(event = %name, error = %e, "Dropping malformed event");
                                        }
                                    }
                                }
                                SocketPacket::ConnectError(data) => {
                                    return Err(TransportError::Refused(data.to_string()));
                                }
                                SocketPacket::Disconnect => return Err(TransportError::ServerClosed),
                                SocketPacket::Ignored => {}
                            },
                            Ok(_) => {}
                            Err(e) => {
                                tracing::warn!(error = %e, "Ignoring undecodable frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await
                            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("Received close frame");
                        return Err(TransportError::ServerClosed);
                    }
                    Some(Err(e)) => {
                        return Err(TransportError::ConnectionFailed(e.to_string()));
                    }
                    None => {
                        return Err(TransportError::ConnectionFailed("Stream ended unexpectedly".into()));
                    }
                    _ => {}
                }
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(TransportCommand::Emit { event, data }) => {
                        write.send(Message::Text(encode_event(&event, &data))).await
                            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                    }
                    Some(TransportCommand::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }

            _ = sleep_until(deadline) => {
                return Err(TransportError::HeartbeatTimeout);
            }
        }
    }
}
