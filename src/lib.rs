//! live-quotes: authenticated real-time equity prices with alert notifications
//!
//! This library provides the core components for:
//! - Credential storage with claim-based expiry
//! - A supervised Socket.IO connection with auth handshake and bounded reconnect
//! - In-process fan-out of price ticks, alerts and connection state
//! - De-duplicated, permission-aware user notifications
//! - REST access to favorites, positions and alert definitions
//! - Structured logging and Prometheus metrics

pub mod api;
pub mod bus;
pub mod cli;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod notify;
pub mod session;
pub mod telemetry;
