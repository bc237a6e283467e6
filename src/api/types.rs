//! REST request and response types

use crate::credentials::UserRef;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Broker commission charged on a sale
pub const BROKER_COMMISSION: Decimal = dec!(0.0097);
/// Margin a position should clear before selling
pub const PROFIT_MARGIN: Decimal = dec!(0.0101);

/// Login body
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Registration body
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// Successful login
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub user: UserRef,
}

/// Registration result; some servers log the new user straight in
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Session check result
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckResponse {
    #[serde(default)]
    pub user: Option<UserRef>,
}

/// `{ "data": ... }` envelope used by the position and alert endpoints
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

/// Search response; the server omits `data` when nothing matched
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub data: Option<Vec<SearchResult>>,
}

/// `{ "favorites": [...] }` response
#[derive(Debug, Deserialize)]
pub(crate) struct FavoritesResponse {
    #[serde(default)]
    pub favorites: Vec<FavoriteEntry>,
}

/// A favorite is either a bare symbol or an object carrying one
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum FavoriteEntry {
    Symbol(String),
    Detailed { symbol: String },
}

impl FavoriteEntry {
    pub fn into_symbol(self) -> String {
        match self {
            FavoriteEntry::Symbol(symbol) | FavoriteEntry::Detailed { symbol } => symbol,
        }
    }
}

/// Error body returned by the server
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Holding in one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub purchase_price: Decimal,
    #[serde(default)]
    pub total_investment: Option<Decimal>,
}

impl Position {
    /// Sale price that covers the commission and clears the margin
    pub fn target_price(&self) -> Decimal {
        self.purchase_price * (Decimal::ONE + PROFIT_MARGIN) / (Decimal::ONE - BROKER_COMMISSION)
    }

    /// Amount paid for the position
    pub fn invested(&self) -> Decimal {
        self.total_investment
            .unwrap_or(self.quantity * self.purchase_price)
    }

    /// Market value at `price`
    pub fn current_value(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }

    /// Unrealized profit or loss at `price`
    pub fn profit_loss(&self, price: Decimal) -> Decimal {
        self.current_value(price) - self.invested()
    }

    /// Unrealized profit or loss as a percentage; `None` for a zero investment
    pub fn profit_loss_pct(&self, price: Decimal) -> Option<Decimal> {
        let invested = self.invested();
        if invested.is_zero() {
            return None;
        }
        Some(self.profit_loss(price) / invested * dec!(100))
    }
}

/// Price alert definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAlert {
    #[serde(alias = "_id", default)]
    pub id: String,
    pub symbol: String,
    pub alert_type: String,
    pub target_price: Decimal,
    #[serde(default)]
    pub percentage_change: Option<Decimal>,
    #[serde(default)]
    pub is_triggered: bool,
}

/// Direction of a price alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Buy,
    Sell,
}

/// Body for creating or replacing the position in a symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPosition {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub purchase_price: Decimal,
}

/// Body for creating a price alert
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub symbol: String,
    pub alert_type: AlertType,
    #[serde(with = "rust_decimal::serde::float")]
    pub target_price: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub percentage_change: Option<Decimal>,
}

/// One stock search hit
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResult {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
}
