use clap::Parser;
use live_quotes::cli::{Cli, Commands};
use live_quotes::config::Config;
use live_quotes::credentials::{claim_expiry, CredentialStore, FileStorage};
use live_quotes::session::Session;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            toml::from_str(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    live_quotes::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Login(args) => {
            let session = Session::from_config(&config)?;
            args.execute(&session).await?;
        }
        Commands::Register(args) => {
            let session = Session::from_config(&config)?;
            args.execute(&session).await?;
        }
        Commands::Logout => {
            let session = Session::from_config(&config)?;
            session.logout().await;
            println!("Logged out");
        }
        Commands::Watch(args) => {
            tracing::info!(url = %config.server.base_url, "Starting live watch");
            let session = Session::from_config(&config)?;
            args.execute(&session).await?;
        }
        Commands::Positions(args) => {
            let session = Session::from_config(&config)?;
            args.execute(&session).await?;
        }
        Commands::Alerts(args) => {
            let session = Session::from_config(&config)?;
            args.execute(&session).await?;
        }
        Commands::Alert(command) => {
            let session = Session::from_config(&config)?;
            command.execute(&session).await?;
        }
        Commands::Buy(args) => {
            let session = Session::from_config(&config)?;
            args.execute(&session).await?;
        }
        Commands::Sell(args) => {
            let session = Session::from_config(&config)?;
            args.execute(&session).await?;
        }
        Commands::Search(args) => {
            let session = Session::from_config(&config)?;
            args.execute(&session).await?;
        }
        Commands::Status => {
            let store = CredentialStore::new(Arc::new(FileStorage::new(
                config.session.storage_path.clone(),
            )))
            .with_validity(chrono::Duration::hours(config.session.validity_hours));

            println!("live-quotes status");
            println!("  Server: {}", config.server.base_url);
            match store.get_credential() {
                Some(credential) => {
                    let name = &credential.issued_user.username;
                    println!("  User: {}", if name.is_empty() { "(unknown)" } else { name });
                    match claim_expiry(&credential.token) {
                        Some(exp) => println!("  Token exp: {}", exp.to_rfc3339()),
                        None => println!("  Token exp: unknown"),
                    }
                    println!("  Expired: {}", store.is_expired());
                }
                None => println!("  Not logged in"),
            }
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Server: {}", config.server.base_url);
            println!(
                "  Connection: handshake {}s, {} retries every {}ms",
                config.connection.handshake_timeout_secs,
                config.connection.reconnect_attempts,
                config.connection.reconnect_delay_ms
            );
            println!(
                "  Notifications: enabled={}, dedup {}s, dismiss {}s",
                config.notifications.enabled,
                config.notifications.dedup_window_secs,
                config.notifications.auto_dismiss_secs
            );
            println!(
                "  Session: {} (valid {}h past exp)",
                config.session.storage_path.display(),
                config.session.validity_hours
            );
            println!(
                "  Telemetry: level={}, format={:?}, metrics={:?}",
                config.telemetry.log_level,
                config.telemetry.log_format,
                config.telemetry.metrics_port
            );
        }
    }

    Ok(())
}
