//! REST client for the quote server
//!
//! Every request carries the stored bearer token. A 401 from any endpoint
//! clears the credential store and fires the unauthorized signal so the
//! session can tear down the live connection.

use super::types::{
    AuthResponse, CheckResponse, Envelope, ErrorBody, FavoriteEntry, FavoritesResponse,
    LoginRequest, NewAlert, NewPosition, Position, PriceAlert, RegisterRequest, RegisterResponse,
    SearchResponse, SearchResult,
};
use crate::config::ServerConfig;
use crate::credentials::{CredentialStore, StorageError, UserRef};
use crate::telemetry::{self, CounterMetric};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// REST failures
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network or decoding failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Server rejected the credential; it has been cleared
    #[error("Unauthorized")]
    Unauthorized,
    /// Any other non-success status
    #[error("Server returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Server-provided reason
        message: String,
    },
    /// Login succeeded but the credential could not be saved
    #[error("Failed to store credential: {0}")]
    Storage(#[from] StorageError),
}

/// Client for the REST endpoints
pub struct ApiClient {
    base_url: String,
    client: Client,
    store: Arc<CredentialStore>,
    unauthorized: broadcast::Sender<()>,
}

impl ApiClient {
    /// Create a client for the configured server
    pub fn new(config: &ServerConfig, store: Arc<CredentialStore>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let (unauthorized, _) = broadcast::channel(16);

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            store,
            unauthorized,
        })
    }

    /// Receiver fired every time a request comes back 401
    pub fn subscribe_unauthorized(&self) -> broadcast::Receiver<()> {
        self.unauthorized.subscribe()
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.store.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("Credential rejected by server, clearing stored session");
            self.store.clear();
            telemetry::increment(CounterMetric::Unauthorized);
            let _ = self.unauthorized.send(());
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            let message = body
                .error
                .or(body.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        Ok(self.execute(request).await?.json().await?)
    }

    /// Log in and store the returned credential
    pub async fn login(&self, email: &str, password: &str) -> Result<UserRef, ApiError> {
        let request = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&LoginRequest { email, password });
        let auth: AuthResponse = self.fetch(request).await?;

        self.store.set_credential(&auth.token, &auth.user)?;
        tracing::info!(user = %auth.user.username, "Logged in");
        Ok(auth.user)
    }

    /// Create an account; stores a credential if the server returns one
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterResponse, ApiError> {
        let request = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&RegisterRequest {
                name,
                email,
                password,
            });
        let response: RegisterResponse = self.fetch(request).await?;

        if let Some(token) = &response.token {
            let user = response.user.clone().unwrap_or_default();
            self.store.set_credential(token, &user)?;
            tracing::info!(user = %user.username, "Registered and logged in");
        }
        Ok(response)
    }

    /// Ask the server whether the stored credential is still valid
    pub async fn check(&self) -> Result<Option<UserRef>, ApiError> {
        let request = self.client.get(self.url("/api/auth/check"));
        let response: CheckResponse = self.fetch(request).await?;
        Ok(response.user)
    }

    /// Favorite symbols
    pub async fn favorites(&self) -> Result<Vec<String>, ApiError> {
        let request = self.client.get(self.url("/api/favorites"));
        let response: FavoritesResponse = self.fetch(request).await?;
        Ok(response
            .favorites
            .into_iter()
            .map(FavoriteEntry::into_symbol)
            .collect())
    }

    /// Add a favorite symbol
    pub async fn add_favorite(&self, symbol: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.url("/api/favorites/add"))
            .json(&json!({ "symbol": symbol }));
        self.execute(request).await?;
        Ok(())
    }

    /// Remove a favorite symbol
    pub async fn remove_favorite(&self, symbol: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.url(&format!("/api/favorites/remove/{}", symbol)));
        self.execute(request).await?;
        Ok(())
    }

    /// Open positions
    pub async fn positions(&self) -> Result<Vec<Position>, ApiError> {
        let request = self.client.get(self.url("/api/positions"));
        let envelope: Envelope<Vec<Position>> = self.fetch(request).await?;
        Ok(envelope.data)
    }

    /// Position in one symbol; `None` when there is no holding
    pub async fn position(&self, symbol: &str) -> Result<Option<Position>, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("/api/positions/{}", symbol)));
        match self.fetch::<Envelope<Option<Position>>>(request).await {
            Ok(envelope) => Ok(envelope.data),
            Err(ApiError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create or replace the position in a symbol
    pub async fn save_position(&self, position: &NewPosition) -> Result<Position, ApiError> {
        let request = self.client.post(self.url("/api/positions")).json(position);
        let envelope: Envelope<Position> = self.fetch(request).await?;
        tracing::info!(symbol = %envelope.data.symbol, "Position saved");
        Ok(envelope.data)
    }

    /// Close the position in a symbol
    pub async fn delete_position(&self, symbol: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.url(&format!("/api/positions/{}", symbol)));
        self.execute(request).await?;
        tracing::info!(symbol, "Position deleted");
        Ok(())
    }

    /// All alert definitions
    pub async fn alerts(&self) -> Result<Vec<PriceAlert>, ApiError> {
        let request = self.client.get(self.url("/api/alerts"));
        let envelope: Envelope<Vec<PriceAlert>> = self.fetch(request).await?;
        Ok(envelope.data)
    }

    /// Alert definitions for one symbol
    pub async fn alerts_for(&self, symbol: &str) -> Result<Vec<PriceAlert>, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("/api/alerts/stock/{}", symbol)));
        let envelope: Envelope<Vec<PriceAlert>> = self.fetch(request).await?;
        Ok(envelope.data)
    }

    /// Define a price alert
    pub async fn create_alert(&self, alert: &NewAlert) -> Result<PriceAlert, ApiError> {
        let request = self.client.post(self.url("/api/alerts")).json(alert);
        let envelope: Envelope<PriceAlert> = self.fetch(request).await?;
        tracing::info!(id = %envelope.data.id, symbol = %envelope.data.symbol, "Alert created");
        Ok(envelope.data)
    }

    /// Remove a price alert by id
    pub async fn delete_alert(&self, id: &str) -> Result<(), ApiError> {
        let request = self.client.delete(self.url(&format!("/api/alerts/{}", id)));
        self.execute(request).await?;
        tracing::info!(id, "Alert deleted");
        Ok(())
    }

    /// Search listed stocks; a blank query matches nothing and sends no request
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .client
            .get(self.url("/api/search/search"))
            .query(&[("q", query)]);
        let response: SearchResponse = self.fetch(request).await?;
        Ok(response.data.unwrap_or_default())
    }
}
