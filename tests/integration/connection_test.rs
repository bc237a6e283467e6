//! Integration tests for the connection manager

use crate::common::{settle, user, Harness};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use live_quotes::bus::{AlertCategory, AlertEvent, BusEvent, Tick, Topic};
use live_quotes::connection::{
    ConnectionConfig, ConnectionError, ConnectionState, ServerMessage, TransportCommand,
};
use live_quotes::notify::GatewayMessage;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_immediate_auth_success_notifies_once() {
    let mut h = Harness::new();
    h.connect_and_authenticate().await;

    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;

    assert_eq!(h.manager.state(), ConnectionState::Connected);
    assert_eq!(
        h.drain_notices(),
        vec![GatewayMessage::ConnectionStatus { connected: true }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_auth_message_carries_stored_token() {
    let h = Harness::new();
    h.manager.connect();
    settle().await;
    h.open(0).await;

    let token = h.store.token().unwrap();
    assert_eq!(
        h.connector.commands(0),
        vec![TransportCommand::Emit {
            event: "auth".to_string(),
            data: json!({ "token": token }),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_errors_at_handshake_timeout() {
    let h = Harness::new();
    h.manager.connect();
    settle().await;
    h.open(0).await;

    tokio::time::advance(Duration::from_millis(9_999)).await;
    settle().await;
    assert_eq!(h.manager.state(), ConnectionState::Authenticating);

    tokio::time::advance(Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(h.manager.state(), ConnectionState::Errored);
    assert_eq!(
        h.last_change().unwrap().error,
        Some(ConnectionError::HandshakeTimeout(Duration::from_secs(10)))
    );
    assert!(h.connector.commands(0).contains(&TransportCommand::Close));
}

#[tokio::test(start_paused = true)]
async fn test_five_failed_reconnects_exhaust_budget() {
    let mut h = Harness::new();
    let first = h.connect_and_authenticate().await;
    h.drop_transport(first).await;
    assert_eq!(h.manager.state(), ConnectionState::Reconnecting);

    for attempt in 1..=5 {
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(h.connector.attempts(), attempt + 1);
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        h.drop_transport(attempt).await;
    }

    assert_eq!(h.manager.state(), ConnectionState::Errored);
    assert_eq!(
        h.last_change().unwrap().error,
        Some(ConnectionError::RetryBudgetExhausted { attempts: 5 })
    );

    tokio::time::advance(Duration::from_secs(120)).await;
    settle().await;
    assert_eq!(h.connector.attempts(), 6);
    assert_eq!(h.manager.state(), ConnectionState::Errored);

    assert_eq!(
        h.drain_notices(),
        vec![
            GatewayMessage::ConnectionStatus { connected: true },
            GatewayMessage::ConnectionStatus { connected: false },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_budget_requires_explicit_connect() {
    let h = Harness::with_config(ConnectionConfig::new("http://localhost:3001").max_reconnects(1));
    let first = h.connect_and_authenticate().await;
    h.drop_transport(first).await;
    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    h.drop_transport(1).await;
    assert_eq!(h.manager.state(), ConnectionState::Errored);

    h.manager.connect();
    settle().await;
    assert_eq!(h.connector.attempts(), 3);
    assert_eq!(h.manager.state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn test_recovered_connection_resets_budget() {
    let mut h = Harness::new();
    let first = h.connect_and_authenticate().await;

    h.drop_transport(first).await;
    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    h.open(1).await;
    h.authenticate(1).await;
    assert_eq!(h.manager.state(), ConnectionState::Connected);

    assert_eq!(
        h.state_sequence(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Authenticating,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Connecting,
            ConnectionState::Authenticating,
            ConnectionState::Connected,
        ]
    );
    assert_eq!(
        h.drain_notices(),
        vec![
            GatewayMessage::ConnectionStatus { connected: true },
            GatewayMessage::ConnectionStatus { connected: false },
            GatewayMessage::ConnectionStatus { connected: true },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_auth_ignores_late_success() {
    let h = Harness::new();
    h.manager.connect();
    settle().await;
    h.open(0).await;

    h.manager.disconnect();
    settle().await;
    h.authenticate(0).await;

    assert_eq!(h.manager.state(), ConnectionState::Disconnected);
    assert!(!h.state_sequence().contains(&ConnectionState::Connected));
}

#[tokio::test(start_paused = true)]
async fn test_auth_error_clears_credential_without_retry() {
    let h = Harness::new();
    h.manager.connect();
    settle().await;
    h.open(0).await;
    h.message(
        0,
        ServerMessage::AuthError {
            message: "Invalid token".to_string(),
        },
    )
    .await;

    assert_eq!(h.manager.state(), ConnectionState::Errored);
    assert!(!h.store.has_credential());

    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(h.connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_retry_stops_reconnecting() {
    let h = Harness::new();
    let first = h.connect_and_authenticate().await;
    h.drop_transport(first).await;

    h.store.clear();
    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;

    assert_eq!(h.manager.state(), ConnectionState::Disconnected);
    assert_eq!(h.connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_data_buffered_during_auth_is_delivered_after_connected() {
    let h = Harness::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let seen = order.clone();
    let _sub = h.bus.subscribe(Topic::AllTicks, move |event| {
        if let BusEvent::Ticks(batch) = event {
            seen.lock().push(batch[0].symbol.clone());
        }
    });

    h.manager.connect();
    settle().await;
    h.open(0).await;
    h.message(
        0,
        ServerMessage::StockUpdate(vec![Tick::new("TCS.NS", dec!(3500))]),
    )
    .await;
    assert!(h.bus.get_snapshot().is_empty());

    h.authenticate(0).await;
    h.message(
        0,
        ServerMessage::StockUpdate(vec![Tick::new("INFY.NS", dec!(1500))]),
    )
    .await;

    assert_eq!(*order.lock(), vec!["TCS.NS", "INFY.NS"]);
    let snapshot = h.bus.get_snapshot();
    assert_eq!(snapshot["TCS.NS"].price, dec!(3500));
    assert_eq!(snapshot["INFY.NS"].price, dec!(1500));
}

#[tokio::test(start_paused = true)]
async fn test_server_alert_reaches_gateway_inbox() {
    let mut h = Harness::new();
    h.connect_and_authenticate().await;
    h.drain_notices();

    let alert = AlertEvent {
        symbol: "TCS.NS".to_string(),
        kind: "buy".to_string(),
        title: "BUY Alert: TCS.NS".to_string(),
        message: "Price crossed 3500".to_string(),
        category: AlertCategory::StockAlert,
    };
    h.message(0, ServerMessage::Notification(alert.clone())).await;

    assert_eq!(h.drain_notices(), vec![GatewayMessage::Alert(alert)]);
}

#[tokio::test(start_paused = true)]
async fn test_watch_state_observes_transitions() {
    let h = Harness::new();
    let mut rx = h.manager.watch_state();
    assert_eq!(*rx.borrow_and_update(), ConnectionState::Disconnected);

    h.connect_and_authenticate().await;
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), ConnectionState::Connected);

    h.manager.disconnect_and_wait().await;
    assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let h = Harness::new();
    h.connect_and_authenticate().await;

    h.manager.disconnect_and_wait().await;
    h.manager.disconnect_and_wait().await;

    let disconnects = h
        .state_sequence()
        .into_iter()
        .filter(|s| *s == ConnectionState::Disconnected)
        .count();
    assert_eq!(disconnects, 1);
}

#[tokio::test(start_paused = true)]
async fn test_far_future_token_still_connects() {
    let h = Harness::new();
    let payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"u1","exp":8210266876799}"#);
    h.store
        .set_credential(&format!("eyJhbGciOiJIUzI1NiJ9.{}.c2ln", payload), &user())
        .unwrap();

    h.manager.connect();
    settle().await;

    assert!(h.manager.is_running());
    assert_eq!(h.connector.attempts(), 1);
    assert_eq!(h.manager.state(), ConnectionState::Connecting);
}
