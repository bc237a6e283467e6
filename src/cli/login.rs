//! Login and register commands

use crate::session::Session;
use clap::Args;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email
    #[arg(short, long, env = "LIVE_QUOTES_EMAIL")]
    pub email: String,

    /// Account password
    #[arg(short, long, env = "LIVE_QUOTES_PASSWORD", hide_env_values = true)]
    pub password: String,
}

impl LoginArgs {
    pub async fn execute(&self, session: &Session) -> anyhow::Result<()> {
        let user = session.api().login(&self.email, &self.password).await?;
        let name = if user.username.is_empty() {
            self.email.as_str()
        } else {
            user.username.as_str()
        };
        println!("Logged in as {}", name);
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Display name
    #[arg(short, long)]
    pub name: String,

    /// Account email
    #[arg(short, long)]
    pub email: String,

    /// Account password
    #[arg(short, long, env = "LIVE_QUOTES_PASSWORD", hide_env_values = true)]
    pub password: String,
}

impl RegisterArgs {
    pub async fn execute(&self, session: &Session) -> anyhow::Result<()> {
        let response = session
            .api()
            .register(&self.name, &self.email, &self.password)
            .await?;

        if response.token.is_some() {
            println!("Registered and logged in as {}", self.name);
        } else {
            println!(
                "{}",
                response
                    .message
                    .as_deref()
                    .unwrap_or("Registration successful, please log in")
            );
        }
        Ok(())
    }
}
