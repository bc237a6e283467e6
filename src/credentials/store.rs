//! Credential store

use super::codec::{decode, encode};
use super::storage::{KeyValueStorage, StorageError};
use super::types::{Credential, UserRef};
use base64::{
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
    Engine as _,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// Storage key for the encoded token
pub const TOKEN_KEY: &str = "stock_market_token";
/// Storage key for the encoded user profile
pub const USER_KEY: &str = "stock_market_user";

/// Default validity window added to the token's `exp` claim
const DEFAULT_VALIDITY_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<f64>,
}

/// Extract the `exp` claim from a JWT-shaped token
///
/// Returns `None` when the token has no payload segment, the payload is not
/// base64 JSON, or it carries no `exp`.
pub fn claim_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.exp?;
    if !exp.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt((exp * 1000.0) as i64).single()
}

/// Owns the persisted bearer credential and user profile
///
/// Constructed once and shared by reference. No operation panics or returns
/// an error on malformed stored data; such data reads as absent.
pub struct CredentialStore {
    storage: Arc<dyn KeyValueStorage>,
    validity: Duration,
}

impl CredentialStore {
    /// Create a store over the given backend with the default 24h window
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            validity: Duration::hours(DEFAULT_VALIDITY_HOURS),
        }
    }

    /// Override the validity window added to the `exp` claim
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Persist a credential, overwriting any previous one
    pub fn set_credential(&self, token: &str, user: &UserRef) -> Result<(), StorageError> {
        let encoded_token = encode(token)?;
        let encoded_user = encode(user)?;
        self.storage.set(TOKEN_KEY, &encoded_token)?;
        self.storage.set(USER_KEY, &encoded_user)?;
        tracing::info!(user = %user.username, "Stored credential");
        Ok(())
    }

    /// Stored credential, or `None` if absent or undecodable
    pub fn get_credential(&self) -> Option<Credential> {
        let token = self.token()?;
        let issued_user = self.user()?;
        Some(Credential { token, issued_user })
    }

    /// Stored token alone
    pub fn token(&self) -> Option<String> {
        let encoded = self.storage.get(TOKEN_KEY)?;
        match decode::<String>(&encoded) {
            Ok(token) if !token.is_empty() => Some(token),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Stored token is unreadable, treating as absent");
                None
            }
        }
    }

    /// Stored user profile alone
    pub fn user(&self) -> Option<UserRef> {
        let encoded = self.storage.get(USER_KEY)?;
        match decode::<UserRef>(&encoded) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "Stored user profile is unreadable, treating as absent");
                None
            }
        }
    }

    /// Whether a usable token is stored
    pub fn has_credential(&self) -> bool {
        self.token().is_some()
    }

    /// Whether the stored credential has expired
    ///
    /// A token whose claims cannot be parsed, or whose expiry plus the
    /// validity window is past the representable range, is treated as NOT
    /// expired. An absent token is expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// [`Self::is_expired`] evaluated at a given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let Some(token) = self.token() else {
            return true;
        };
        match claim_expiry(&token) {
            Some(exp) => exp
                .checked_add_signed(self.validity)
                .is_some_and(|deadline| now > deadline),
            None => false,
        }
    }

    /// Token that may be used for a connection attempt right now
    pub fn usable_token(&self) -> Option<String> {
        if self.is_expired() {
            return None;
        }
        self.token()
    }

    /// Remove token and profile; safe to call repeatedly
    pub fn clear(&self) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!(key, error = %e, "Failed to remove stored entry");
            }
        }
        tracing::info!("Cleared stored credential");
    }
}
