use std::sync::Arc;

use anyhow::Context;

use neobridge::config::Config;
use neobridge::mail::ImapMailbox;
use neobridge::notify::{DiscordWebhook, NotifySink};
use neobridge::watch::{MessageFilter, WatchLoop};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    eprintln!("neobridge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   IMAP: {}:{} as {}",
        config.imap.host, config.imap.port, config.imap.username
    );
    eprintln!("   Watching for: {}\n", config.expected_sender);

    let mailbox = ImapMailbox::connect(&config.imap)
        .await
        .context("Failed to open the mailbox session")?;
    tracing::info!("Logged in as {}", config.imap.username);

    let sink: Arc<dyn NotifySink> = Arc::new(DiscordWebhook::new(config.webhook_url.clone()));
    let filter = MessageFilter::new(config.expected_sender.clone());

    WatchLoop::new(mailbox, sink, filter, config.message_text.clone())
        .run()
        .await
        .context("Watch loop terminated")?;

    Ok(())
}
