//! Integration tests for the REST client against a mock server

use crate::common::{token_expiring_in, user};
use live_quotes::api::{AlertType, ApiClient, ApiError, NewAlert, NewPosition};
use live_quotes::config::ServerConfig;
use live_quotes::credentials::{CredentialStore, MemoryStorage};
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> (ApiClient, Arc<CredentialStore>) {
    let config = ServerConfig {
        base_url: server.uri(),
        request_timeout_secs: 5,
    };
    let store = Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new())));
    let api = ApiClient::new(&config, store.clone()).unwrap();
    (api, store)
}

#[tokio::test]
async fn test_login_stores_credential() {
    let server = MockServer::start().await;
    let token = token_expiring_in(3600);
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({ "email": "kiran@example.com", "password": "hunter2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": token,
            "user": { "_id": "u1", "name": "kiran", "email": "kiran@example.com" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, store) = client(&server);
    let logged_in = api.login("kiran@example.com", "hunter2").await.unwrap();

    assert_eq!(logged_in, user());
    assert_eq!(store.token(), Some(token));
    assert_eq!(store.user(), Some(user()));
}

#[tokio::test]
async fn test_login_failure_keeps_store_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "Invalid credentials" })),
        )
        .mount(&server)
        .await;

    let (api, store) = client(&server);
    let err = api.login("kiran@example.com", "wrong").await.unwrap_err();

    match err {
        ApiError::Status { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid credentials");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!store.has_credential());
}

#[tokio::test]
async fn test_requests_carry_bearer_token() {
    let server = MockServer::start().await;
    let token = token_expiring_in(3600);
    Mock::given(method("GET"))
        .and(path("/api/favorites"))
        .and(header("Authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "favorites": ["TCS.NS", { "symbol": "INFY.NS" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, store) = client(&server);
    store.set_credential(&token, &user()).unwrap();

    assert_eq!(api.favorites().await.unwrap(), vec!["TCS.NS", "INFY.NS"]);
}

#[tokio::test]
async fn test_unauthorized_clears_store_and_signals() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/positions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "jwt expired" })))
        .mount(&server)
        .await;

    let (api, store) = client(&server);
    store.set_credential(&token_expiring_in(3600), &user()).unwrap();
    let mut unauthorized = api.subscribe_unauthorized();

    let err = api.positions().await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized));
    assert!(!store.has_credential());
    assert!(unauthorized.try_recv().is_ok());
}

#[tokio::test]
async fn test_positions_unwrap_data_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/positions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "symbol": "TCS.NS", "quantity": 10, "purchasePrice": 3500 },
                { "symbol": "INFY.NS", "quantity": 4, "purchasePrice": 1500.5, "totalInvestment": 6010 }
            ]
        })))
        .mount(&server)
        .await;

    let (api, _store) = client(&server);
    let positions = api.positions().await.unwrap();

    assert_eq!(positions.len(), 2);
    assert_eq!(positions[0].invested(), dec!(35000));
    assert_eq!(positions[1].invested(), dec!(6010));
    assert_eq!(positions[0].profit_loss(dec!(3600)), dec!(1000));
}

#[tokio::test]
async fn test_remove_favorite_hits_symbol_path() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/favorites/remove/TCS.NS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _store) = client(&server);
    api.remove_favorite("TCS.NS").await.unwrap();
}

#[tokio::test]
async fn test_alerts_for_symbol() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/alerts/stock/TCS.NS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "_id": "a1",
                "symbol": "TCS.NS",
                "alertType": "price_above",
                "targetPrice": 3600,
                "isTriggered": false
            }]
        })))
        .mount(&server)
        .await;

    let (api, _store) = client(&server);
    let alerts = api.alerts_for("TCS.NS").await.unwrap();

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, "a1");
    assert_eq!(alerts[0].target_price, dec!(3600));
    assert!(!alerts[0].is_triggered);
}

#[tokio::test]
async fn test_register_without_token_does_not_log_in() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "message": "Account created" })),
        )
        .mount(&server)
        .await;

    let (api, store) = client(&server);
    let response = api
        .register("kiran", "kiran@example.com", "hunter2")
        .await
        .unwrap();

    assert_eq!(response.message.as_deref(), Some("Account created"));
    assert!(!store.has_credential());
}

#[tokio::test]
async fn test_save_position_posts_numbers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/positions"))
        .and(body_json(json!({
            "symbol": "TCS.NS",
            "quantity": 10.0,
            "purchasePrice": 3450.5
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {
                "symbol": "TCS.NS",
                "quantity": 10,
                "purchasePrice": 3450.5,
                "totalInvestment": 34505
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _) = client(&server);
    let saved = api
        .save_position(&NewPosition {
            symbol: "TCS.NS".to_string(),
            quantity: dec!(10),
            purchase_price: dec!(3450.5),
        })
        .await
        .unwrap();

    assert_eq!(saved.symbol, "TCS.NS");
    assert_eq!(saved.invested(), dec!(34505));
}

#[tokio::test]
async fn test_position_lookup_by_symbol() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/positions/INFY.NS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "symbol": "INFY.NS", "quantity": 5, "purchasePrice": 1500 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/positions/WIPRO.NS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/positions/HDFC.NS"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "error": "Position not found" })),
        )
        .mount(&server)
        .await;

    let (api, _) = client(&server);
    let held = api.position("INFY.NS").await.unwrap().unwrap();
    assert_eq!(held.quantity, dec!(5));
    assert!(api.position("WIPRO.NS").await.unwrap().is_none());
    assert!(api.position("HDFC.NS").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_position_hits_symbol_path() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/positions/TCS.NS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _) = client(&server);
    api.delete_position("TCS.NS").await.unwrap();
}

#[tokio::test]
async fn test_create_alert_returns_definition() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/alerts"))
        .and(body_json(json!({
            "symbol": "TCS.NS",
            "alertType": "buy",
            "targetPrice": 3400.0,
            "percentageChange": 2.5
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {
                "_id": "a7",
                "symbol": "TCS.NS",
                "alertType": "buy",
                "targetPrice": 3400,
                "percentageChange": 2.5,
                "isTriggered": false
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _) = client(&server);
    let alert = api
        .create_alert(&NewAlert {
            symbol: "TCS.NS".to_string(),
            alert_type: AlertType::Buy,
            target_price: dec!(3400),
            percentage_change: Some(dec!(2.5)),
        })
        .await
        .unwrap();

    assert_eq!(alert.id, "a7");
    assert_eq!(alert.percentage_change, Some(dec!(2.5)));
    assert!(!alert.is_triggered);
}

#[tokio::test]
async fn test_delete_alert_hits_id_path() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/alerts/a7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _) = client(&server);
    api.delete_alert("a7").await.unwrap();
}

#[tokio::test]
async fn test_search_sends_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/search/search"))
        .and(query_param("q", "tata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "symbol": "TCS.NS", "name": "Tata Consultancy Services", "price": 3500.25 },
                { "symbol": "TATAMOTORS.NS", "name": "Tata Motors" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _) = client(&server);
    let results = api.search(" tata ").await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].price, Some(dec!(3500.25)));
    assert!(results[1].price.is_none());
}

#[tokio::test]
async fn test_blank_search_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/search/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let (api, _) = client(&server);
    assert!(api.search("   ").await.unwrap().is_empty());
}
