//! Telegram Downloader
//!
//! Downloads documents sent by a single authorized operator into a local
//! directory, with confirmation, retries, live progress and a `/status`
//! listing of in-flight transfers.

mod access;
mod config;
mod errors;
mod fetch;
mod format;
mod handlers;
mod health;
mod status_updater;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use teloxide::prelude::*;
use teloxide::types::Message;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transfer_core::{SystemFs, TransferExecutor, TransferRegistry};

use crate::access::AccessPolicy;
use crate::config::Config;
use crate::fetch::{FetchMode, TelegramFetcher};
use crate::handlers::App;

/// Telegram Downloader CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/telegram-downloader.toml")]
    config: String,

    /// Telegram bot token (overrides config file)
    #[arg(long, env = "TELEGRAM_BOT_TOKEN")]
    bot_token: Option<String>,

    /// Destination directory (overrides config file)
    #[arg(long, env = "DOWNLOAD_TO_DIR")]
    download_dir: Option<PathBuf>,

    /// Health check server port (overrides config file)
    #[arg(long, env = "HEALTH_CHECK_PORT")]
    health_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telegram_downloader=debug,transfer_core=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Telegram Downloader");

    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let mut config = if std::path::Path::new(&args.config).exists() {
        info!("Loading config from file: {}", args.config);
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using environment variables");
        Config::from_env()?
    };

    // Override with CLI arguments
    if let Some(bot_token) = args.bot_token {
        config.telegram.bot_token = bot_token;
    }
    if let Some(download_dir) = args.download_dir {
        config.downloads.destination_dir = download_dir;
    }
    if let Some(port) = args.health_port {
        config.health.port = port;
    }
    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Download directory: {}", config.downloads.destination_dir.display());
    info!(
        "Retries: {} attempts, {}s linear backoff",
        config.downloads.max_retries, config.downloads.initial_retry_delay_secs
    );

    // Create Telegram bot
    info!("Initializing Telegram bot...");
    let bot = build_bot(&config)?;

    // Verify bot token
    let bot_username = match bot.get_me().await {
        Ok(me) => {
            let username = me.username().to_string();
            info!("Bot authenticated as: @{}", username);
            Some(username)
        }
        Err(e) => {
            error!("Failed to authenticate bot: {}", e);
            return Err(e.into());
        }
    };

    let mode = match &config.downloads.local_api_dir {
        Some(api_dir) => {
            info!("Using local Bot API files from {}", api_dir.display());
            FetchMode::LocalApi {
                api_dir: api_dir.clone(),
            }
        }
        None => FetchMode::Download {
            temp_dir: config.downloads.temp_dir.clone(),
        },
    };

    let registry = TransferRegistry::new();
    let executor = TransferExecutor::new(
        registry.clone(),
        TelegramFetcher::new(bot.clone(), mode),
        SystemFs,
        config.downloads.destination_dir.clone(),
    )
    .with_retry_policy(config.downloads.retry_policy());

    let app = App {
        executor: Arc::new(executor),
        access: AccessPolicy::from(&config.access),
        status_page_size: config.downloads.status_page_size,
        progress_interval: config.downloads.progress_interval(),
    };

    // Create health check state
    let health_state = health::AppState::new(bot_username, registry);

    // Start health check server
    let health_state_clone = health_state.clone();
    let health_port = config.health.port;
    tokio::spawn(async move {
        if let Err(e) = health::start_health_server(health_state_clone, health_port).await {
            error!("Health check server error: {}", e);
        }
    });

    info!("Bot initialized, starting message dispatcher...");

    let message_handler = Update::filter_message()
        .branch(
            dptree::filter(|msg: Message| msg.document().is_some())
                .endpoint(handlers::handle_document_message),
        )
        .branch(
            dptree::filter(|msg: Message| msg.text().is_some())
                .endpoint(handlers::handle_text_message),
        );

    let callback_handler =
        Update::filter_callback_query().endpoint(handlers::handle_callback_query);

    let all_handlers = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    let error_handler =
        handlers::error_handler::NotifyOperator::new(bot.clone(), &config.access);

    Dispatcher::builder(bot, all_handlers)
        .dependencies(dptree::deps![app, health_state])
        .error_handler(error_handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Telegram Downloader stopped");
    Ok(())
}

fn build_bot(config: &Config) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(config.telegram.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let bot = Bot::with_client(&config.telegram.bot_token, client);
    match &config.telegram.api_url {
        Some(api_url) => {
            let url = url::Url::parse(api_url)
                .with_context(|| format!("Invalid telegram.api_url: {}", api_url))?;
            info!("Using Bot API server at {}", url);
            Ok(bot.set_api_url(url))
        }
        None => Ok(bot),
    }
}
