//! REST API client
//!
//! Auth, favorites, positions, alert definitions and stock search. Live prices do not go
//! through here; see [`crate::connection`].

mod client;
mod types;

pub use client::{ApiClient, ApiError};
pub use types::{
    AlertType, AuthResponse, CheckResponse, LoginRequest, NewAlert, NewPosition, Position,
    PriceAlert, RegisterRequest, RegisterResponse, SearchResult, BROKER_COMMISSION,
    PROFIT_MARGIN,
};
