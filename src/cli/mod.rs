//! CLI interface for live-quotes
//!
//! Provides subcommands for:
//! - `login` / `register` / `logout`: manage the stored session
//! - `watch`: stream live prices, alerts and connection state
//! - `positions` / `alerts`: show portfolio data from the REST API
//! - `buy` / `sell`: record or close a position
//! - `alert add` / `alert remove`: manage price alerts
//! - `search`: look up listed stocks
//! - `status`: show the stored session
//! - `config`: show the effective configuration

mod login;
mod portfolio;
mod watch;

pub use login::{LoginArgs, RegisterArgs};
pub use portfolio::{AlertCommand, AlertsArgs, BuyArgs, PositionsArgs, SearchArgs, SellArgs, Side};
pub use watch::WatchArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "live-quotes")]
#[command(about = "Real-time equity prices with alert notifications")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and store the session
    Login(LoginArgs),
    /// Create an account
    Register(RegisterArgs),
    /// Close the connection and forget the stored session
    Logout,
    /// Stream live prices
    Watch(WatchArgs),
    /// Show open positions with target prices
    Positions(PositionsArgs),
    /// Show alert definitions
    Alerts(AlertsArgs),
    /// Create or remove a price alert
    #[command(subcommand)]
    Alert(AlertCommand),
    /// Record a position
    Buy(BuyArgs),
    /// Close a position
    Sell(SellArgs),
    /// Search listed stocks
    Search(SearchArgs),
    /// Show the stored session
    Status,
    /// Show configuration
    Config,
}
