//! SyncFamily bot
//!
//! Long-polls the Bot API and keeps every family member's shopping list
//! message in sync.
//!
//! # Configuration
//!
//! Read from `~/.config/syncfamily/config.yaml` (or `--config`), with
//! environment overrides:
//! - `SYNCFAMILY_BOT_TOKEN`: Bot API token (required)
//! - `SYNCFAMILY_BOT_USERNAME`: Bot username used in invite links
//! - `SYNCFAMILY_DATABASE_PATH`: SQLite database file
//! - `SYNCFAMILY_API_URL`: Bot API base URL

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use syncfamily::db::init_db;
use syncfamily::transport::{ChatTransport, TelegramClient};
use syncfamily::{Config, Orchestrator};

/// Pause after a failed poll before trying again.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "syncfamily")]
#[command(version)]
#[command(about = "Shared family shopping list bot", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "syncfamily=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;
    let token = config.require_token()?;
    tracing::info!(
        "Using bot token {}... as @{}",
        token.chars().take(4).collect::<String>(),
        config.bot_username
    );

    tracing::info!("Database: {}", config.database_path.display());
    let pool = init_db(&config.database_path).await?;

    let client = TelegramClient::new(&config.api_url, token, config.request_timeout())?;
    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        client.clone(),
        config.bot_username.clone(),
    ));

    tracing::info!("Polling for updates");
    let mut offset = 0;
    loop {
        let updates = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            result = client.get_updates(offset, config.poll_timeout()) => result,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!("Failed to poll updates: {}", e);
                tokio::time::sleep(POLL_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            if let Some(callback_id) = update.orphan_callback_id() {
                if let Err(e) = client.answer_callback(callback_id).await {
                    tracing::warn!("Failed to answer callback {}: {}", callback_id, e);
                }
            }
            let Some(event) = update.into_event() else {
                continue;
            };

            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                let outcome = orchestrator.handle(event).await;
                tracing::debug!("Event handled: {:?}", outcome);
            });
        }
    }

    pool.close().await;
    Ok(())
}
