use std::sync::Arc;

use teloxide::prelude::*;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use relaybot::config::{Config, ConfigError};
use relaybot::relay::router::RouterError;
use relaybot::relay::{RelayBot, Storage, StoreError, TelegramClient, spawn_workers};
use relaybot::server::{self, AppState};

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),
    #[error("telegram authorization failed: {0}")]
    Auth(#[from] teloxide::RequestError),
    #[error("command registration failed: {0}")]
    Commands(#[from] RouterError),
    #[error("http server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::never(&log_dir, "relaybot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    if let Err(e) = run(config).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    info!("🚀 Starting relaybot...");
    info!("Admin ID: {}", config.admin_id);

    let storage = Arc::new(Storage::open(&config.database_path())?);

    let bot = Bot::new(&config.telegram_bot_token);
    let me = bot.get_me().await?;
    info!("authorized success: @{} ({})", me.username(), me.id);

    let telegram = Arc::new(TelegramClient::new(bot));
    let relay = Arc::new(RelayBot::new(telegram, storage, config.admin_id.0)?);
    relay.publish_commands().await;

    let (updates, _workers) = spawn_workers(relay.clone(), config.workers);

    if let Err(e) = relay.ensure_webhook(&config.webhook_url()).await {
        warn!("SetWebhook failed: {e}");
    }

    let state = Arc::new(AppState { bot: relay, updates });
    let app = server::router(&config.telegram_bot_token, state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Listening on port {}", config.port);
    axum::serve(listener, app).await?;
    Ok(())
}
