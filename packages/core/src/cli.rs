use clap::Parser;

/// Postpartum care service CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "postpartum-care",
    version,
    about = "Postpartum monitoring schedule and clinical alert service"
)]
pub struct Cli {
    /// SQLite database URL (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Address the HTTP server binds to (overrides BIND_ADDR)
    #[arg(long)]
    pub bind_addr: Option<String>,

    /// Webhook receiving urgent alerts (overrides ALERT_WEBHOOK_URL)
    #[arg(long)]
    pub alert_webhook_url: Option<String>,
}

impl Cli {
    /// Flag value standing in for the environment variable `key`.
    pub fn value_for(&self, key: &str) -> Option<String> {
        match key {
            "DATABASE_URL" => self.database_url.clone(),
            "BIND_ADDR" => self.bind_addr.clone(),
            "ALERT_WEBHOOK_URL" => self.alert_webhook_url.clone(),
            _ => None,
        }
    }
}
