//! Integration tests for live-quotes

mod api_test;
mod common;
mod connection_test;
mod credentials_test;
mod session_test;
