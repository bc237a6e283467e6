//! Integration tests for session wiring: REST login, live connection, logout

use crate::common::{token_expiring_in, MockConnector};
use live_quotes::api::ApiError;
use live_quotes::bus::Tick;
use live_quotes::config::Config;
use live_quotes::connection::{ConnectionState, ServerMessage, TransportEvent};
use live_quotes::credentials::MemoryStorage;
use live_quotes::notify::ConsolePlatform;
use live_quotes::session::Session;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn wait_for_state(session: &Session, wanted: ConnectionState) {
    let mut rx = session.manager().watch_state();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|state| *state == wanted))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {wanted}"))
        .unwrap();
}

async fn start(server: &MockServer) -> (Session, Arc<MockConnector>) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": token_expiring_in(3600),
            "user": { "id": "u1", "username": "kiran" }
        })))
        .mount(server)
        .await;

    let mut config = Config::default();
    config.server.base_url = server.uri();
    let connector = Arc::new(MockConnector::default());
    let session = Session::start(
        &config,
        Arc::new(MemoryStorage::new()),
        Arc::new(ConsolePlatform::new()),
        connector.clone(),
    )
    .unwrap();
    (session, connector)
}

async fn login_and_connect(session: &Session, connector: &MockConnector) {
    session.login("kiran@example.com", "hunter2").await.unwrap();
    wait_for_state(session, ConnectionState::Connecting).await;

    let events = connector.events(0);
    events.send(TransportEvent::Open).await.unwrap();
    events
        .send(TransportEvent::Message(ServerMessage::AuthSuccess { user: None }))
        .await
        .unwrap();
    wait_for_state(session, ConnectionState::Connected).await;
}

#[tokio::test]
async fn test_login_opens_live_connection() {
    let server = MockServer::start().await;
    let (session, connector) = start(&server).await;

    login_and_connect(&session, &connector).await;

    assert_eq!(connector.attempts(), 1);
    assert!(session.store().has_credential());
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_logout_disconnects_and_forgets_credential() {
    let server = MockServer::start().await;
    let (session, connector) = start(&server).await;
    login_and_connect(&session, &connector).await;

    session.logout().await;

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(!session.store().has_credential());
}

#[tokio::test]
async fn test_unauthorized_rest_call_drops_live_connection() {
    let server = MockServer::start().await;
    let (session, connector) = start(&server).await;
    login_and_connect(&session, &connector).await;

    Mock::given(method("GET"))
        .and(path("/api/positions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = session.api().positions().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));

    wait_for_state(&session, ConnectionState::Disconnected).await;
    assert!(!session.store().has_credential());
}

#[tokio::test]
async fn test_connect_without_login_stays_disconnected() {
    let server = MockServer::start().await;
    let (session, connector) = start(&server).await;

    session.connect();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_accessors_share_live_components() {
    let server = MockServer::start().await;
    let (session, connector) = start(&server).await;
    login_and_connect(&session, &connector).await;

    connector
        .events(0)
        .send(TransportEvent::Message(ServerMessage::StockUpdate(vec![
            Tick::new("TCS.NS", dec!(3500)),
        ])))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while session.bus().latest("TCS.NS").is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("tick never reached the bus");

    assert!(session.gateway().is_supported());
    assert!(session.manager().is_running());
    assert!(session.store().usable_token().is_some());
}
