mod config;
mod db;
mod moderation;
mod telegram;
mod watcher;

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::{Config, ConfigError};
use db::{ActivityStore, Database, StoreError};
use telegram::{AppState, TelegramClient};
use watcher::{Recorder, Scanner};

#[derive(Parser)]
#[command(name = "telekick")]
#[command(about = "Bans chat members who stay silent for too long")]
#[command(version)]
struct Cli {
    /// Show stats: members by time since their last activity, then exit
    #[arg(short = 'S', long)]
    stats: bool,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("database open: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("telegram bot init: {0}")]
    Telegram(#[from] teloxide::RequestError),
    #[error("stats: {0}")]
    Stats(#[from] StoreError),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let config = Config::from_env()?;

    info!("Telekick v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn ActivityStore> = Arc::new(Database::open(&config.database_path)?);

    let bot = Bot::new(&config.telegram_token);
    let me = bot.get_me().await?;
    info!("Logged in as @{}", me.username());

    let client = TelegramClient::new(bot.clone());

    if cli.stats {
        let report = watcher::build_report(store.as_ref(), &client, Utc::now()).await?;
        println!("{report}");
        return Ok(());
    }

    let scanner = Scanner::new(
        store.clone(),
        Arc::new(client.clone()),
        config.chat_id,
        config.inactivity,
        config.scan_interval,
    );

    let state = Arc::new(AppState {
        recorder: Recorder::new(store.clone()),
        store,
        client,
    });

    tokio::spawn(telegram::run_bot(bot, state));
    tokio::spawn(scanner.run());

    info!("telekick started, watching chat {}", config.chat_id);

    shutdown_signal().await;
    info!("telekick stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
