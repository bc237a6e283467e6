//! Watch command implementation

use crate::bus::{BusEvent, Subscription, Tick, Topic};
use crate::connection::ConnectionState;
use crate::session::Session;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Symbols to show (all when omitted)
    #[arg(short, long = "symbol")]
    pub symbols: Vec<String>,
}

impl WatchArgs {
    pub async fn execute(&self, session: &Session) -> anyhow::Result<()> {
        if !session.store().has_credential() {
            anyhow::bail!("Not logged in, run `live-quotes login` first");
        }

        let _subscriptions = self.subscribe(session);
        session.connect();
        println!("Watching live prices. Enter `r` to reconnect, `q` to quit.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let mut interacted = false;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                line = lines.next_line(), if stdin_open => {
                    let Some(line) = line? else {
                        stdin_open = false;
                        continue;
                    };
                    if !interacted {
                        interacted = true;
                        let permission = session.on_user_interaction().await;
                        tracing::debug!(?permission, "Notification permission");
                    }
                    match line.trim() {
                        "" => {}
                        "r" => {
                            if session.state().is_active() {
                                println!("Already {}", session.state());
                            } else {
                                session.connect();
                            }
                        }
                        "q" => break,
                        other => println!("Unknown command: {}", other),
                    }
                }
            }
        }

        session.manager().disconnect_and_wait().await;
        Ok(())
    }

    fn subscribe(&self, session: &Session) -> Vec<Subscription> {
        let bus = session.bus();
        let mut subscriptions = Vec::new();

        if self.symbols.is_empty() {
            subscriptions.push(bus.subscribe(Topic::AllTicks, |event| {
                if let BusEvent::Ticks(batch) = event {
                    batch.iter().for_each(print_tick);
                }
            }));
        } else {
            for symbol in &self.symbols {
                let wanted = symbol.clone();
                subscriptions.push(bus.subscribe(Topic::symbol(symbol.as_str()), move |event| {
                    if let BusEvent::Ticks(batch) = event {
                        batch
                            .iter()
                            .filter(|tick| tick.symbol == wanted)
                            .for_each(print_tick);
                    }
                }));
            }
        }

        subscriptions.push(bus.subscribe(Topic::Alerts, |event| {
            if let BusEvent::Alert(alert) = event {
                println!("[alert] {}: {}", alert.title, alert.message);
            }
        }));

        subscriptions.push(bus.subscribe(Topic::ConnectionState, |event| {
            if let BusEvent::State(change) = event {
                match (&change.error, change.current) {
                    (Some(err), ConnectionState::Errored) => {
                        println!("[{}] {} (enter `r` to retry)", change.current, err)
                    }
                    (Some(err), _) => println!("[{}] {}", change.current, err),
                    (None, current) => println!("[{}]", current),
                }
            }
        }));

        subscriptions
    }
}

fn print_tick(tick: &Tick) {
    let time = tick
        .timestamp
        .map(|ts| ts.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    match tick.field_f64("changePercent") {
        Some(change) => println!("{} {:<14} {:>12} {:>+7.2}%", time, tick.symbol, tick.price, change),
        None => println!("{} {:<14} {:>12}", time, tick.symbol, tick.price),
    }
}
