//! Positions, alerts and search commands

use crate::api::{AlertType, NewAlert, NewPosition};
use crate::session::Session;
use anyhow::bail;
use clap::{Args, Subcommand, ValueEnum};
use rust_decimal::Decimal;

#[derive(Args, Debug)]
pub struct PositionsArgs {
    /// Also list favorite symbols
    #[arg(short, long)]
    pub favorites: bool,
}

impl PositionsArgs {
    pub async fn execute(&self, session: &Session) -> anyhow::Result<()> {
        let positions = session.api().positions().await?;
        if positions.is_empty() {
            println!("No open positions");
        }
        for p in &positions {
            println!(
                "{:<14} qty {:>8}  bought {:>10.2}  target {:>10.2}  invested {:>12.2}",
                p.symbol,
                p.quantity,
                p.purchase_price,
                p.target_price().round_dp(2),
                p.invested()
            );
        }

        if self.favorites {
            let favorites = session.api().favorites().await?;
            println!("Favorites: {}", favorites.join(", "));
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct AlertsArgs {
    /// Only alerts for this symbol
    pub symbol: Option<String>,
}

impl AlertsArgs {
    pub async fn execute(&self, session: &Session) -> anyhow::Result<()> {
        let alerts = match &self.symbol {
            Some(symbol) => session.api().alerts_for(symbol).await?,
            None => session.api().alerts().await?,
        };
        if alerts.is_empty() {
            println!("No alerts");
        }
        for a in &alerts {
            let status = if a.is_triggered { "triggered" } else { "active" };
            match a.percentage_change {
                Some(pct) => println!(
                    "{:<14} {:<5} target {:>10.2} ({}%)  {}",
                    a.symbol, a.alert_type, a.target_price, pct, status
                ),
                None => println!(
                    "{:<14} {:<5} target {:>10.2}  {}",
                    a.symbol, a.alert_type, a.target_price, status
                ),
            }
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct BuyArgs {
    /// Symbol to hold
    pub symbol: String,

    /// Number of shares
    #[arg(short, long)]
    pub quantity: Decimal,

    /// Price paid per share
    #[arg(short, long)]
    pub price: Decimal,
}

impl BuyArgs {
    pub async fn execute(&self, session: &Session) -> anyhow::Result<()> {
        if self.quantity <= Decimal::ZERO || self.price <= Decimal::ZERO {
            bail!("Quantity and price must be positive");
        }
        let saved = session
            .api()
            .save_position(&NewPosition {
                symbol: self.symbol.clone(),
                quantity: self.quantity,
                purchase_price: self.price,
            })
            .await?;
        println!(
            "Holding {} x {} at {:.2}, sell target {:.2}",
            saved.quantity,
            saved.symbol,
            saved.purchase_price,
            saved.target_price().round_dp(2)
        );
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct SellArgs {
    /// Symbol to close
    pub symbol: String,

    /// Sale price used to report profit or loss
    #[arg(short, long)]
    pub price: Option<Decimal>,
}

impl SellArgs {
    pub async fn execute(&self, session: &Session) -> anyhow::Result<()> {
        let Some(position) = session.api().position(&self.symbol).await? else {
            bail!("No position in {}", self.symbol);
        };
        session.api().delete_position(&self.symbol).await?;

        match self.price {
            Some(price) => {
                let pct = position
                    .profit_loss_pct(price)
                    .map(|p| format!(" ({:.2}%)", p))
                    .unwrap_or_default();
                println!(
                    "Closed {} x {}: P/L {:.2}{}",
                    position.quantity,
                    position.symbol,
                    position.profit_loss(price),
                    pct
                );
            }
            None => println!("Closed {} x {}", position.quantity, position.symbol),
        }
        Ok(())
    }
}

/// Alert direction as typed on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl From<Side> for AlertType {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => AlertType::Buy,
            Side::Sell => AlertType::Sell,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum AlertCommand {
    /// Define a price alert
    Add {
        /// Symbol to watch
        symbol: String,

        /// Alert direction
        #[arg(short = 't', long = "type", value_enum)]
        side: Side,

        /// Price that triggers the alert
        #[arg(long)]
        target: Decimal,

        /// Percentage move that also triggers the alert
        #[arg(long)]
        change: Option<Decimal>,
    },
    /// Remove a price alert
    Remove {
        /// Alert id as listed by `alerts`
        id: String,
    },
}

impl AlertCommand {
    pub async fn execute(&self, session: &Session) -> anyhow::Result<()> {
        match self {
            AlertCommand::Add {
                symbol,
                side,
                target,
                change,
            } => {
                if *target <= Decimal::ZERO {
                    bail!("Target price must be positive");
                }
                let alert = session
                    .api()
                    .create_alert(&NewAlert {
                        symbol: symbol.clone(),
                        alert_type: (*side).into(),
                        target_price: *target,
                        percentage_change: *change,
                    })
                    .await?;
                println!(
                    "Alert {} set: {} {} at {:.2}",
                    alert.id, alert.alert_type, alert.symbol, alert.target_price
                );
            }
            AlertCommand::Remove { id } => {
                session.api().delete_alert(id).await?;
                println!("Alert {} removed", id);
            }
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Company name or symbol fragment
    pub query: String,
}

impl SearchArgs {
    pub async fn execute(&self, session: &Session) -> anyhow::Result<()> {
        let results = session.api().search(&self.query).await?;
        if results.is_empty() {
            println!("No matches");
        }
        for r in &results {
            let name = r.name.as_deref().unwrap_or("");
            match r.price {
                Some(price) => println!("{:<14} {:<40} {:>10.2}", r.symbol, name, price),
                None => println!("{:<14} {}", r.symbol, name),
            }
        }
        Ok(())
    }
}
