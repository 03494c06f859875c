//! Configuration management for telegram-downloader

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use transfer_core::RetryPolicy;

/// Complete bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub access: AccessConfig,
    pub downloads: DownloadConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// Telegram connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from BotFather
    #[serde(default = "default_bot_token")]
    pub bot_token: String,
    /// Base URL of a self-hosted Bot API server, e.g. "http://localhost:8081"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Per-request timeout; `getFile` on a local server blocks until the
    /// server itself has fetched the file
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// The single operator allowed to use the bot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessConfig {
    pub user_id: u64,
    pub chat_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Where finished files are placed
    pub destination_dir: PathBuf,
    /// Scratch directory for partial downloads
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Working directory of a local Bot API server. When set, files are
    /// taken from `<local_api_dir>/<token>/documents/` instead of streamed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_api_dir: Option<PathBuf>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_retry_delay_secs")]
    pub initial_retry_delay_secs: u64,
    /// Minimum spacing between progress edits
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
    /// Records per `/status` message
    #[serde(default = "default_status_page_size")]
    pub status_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_port")]
    pub port: u16,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bot_token = lookup("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN not set")?;

        let user_id = lookup("USER_ID")
            .context("USER_ID not set")?
            .trim()
            .parse()
            .context("USER_ID must be a numeric Telegram user id")?;
        let chat_id = lookup("CHAT_ID")
            .context("CHAT_ID not set")?
            .trim()
            .parse()
            .context("CHAT_ID must be a numeric Telegram chat id")?;

        let destination_dir = lookup("DOWNLOAD_TO_DIR")
            .map(PathBuf::from)
            .context("DOWNLOAD_TO_DIR not set")?;
        let temp_dir = lookup("DOWNLOAD_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_temp_dir);

        let health_port = lookup("HEALTH_CHECK_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(default_health_port);

        Ok(Config {
            telegram: TelegramConfig {
                bot_token,
                api_url: lookup("TELEGRAM_API_URL"),
                request_timeout_secs: default_request_timeout_secs(),
            },
            access: AccessConfig { user_id, chat_id },
            downloads: DownloadConfig {
                destination_dir,
                temp_dir,
                local_api_dir: lookup("BOT_API_DIR").map(PathBuf::from),
                max_retries: default_max_retries(),
                initial_retry_delay_secs: default_initial_retry_delay_secs(),
                progress_interval_secs: default_progress_interval_secs(),
                status_page_size: default_status_page_size(),
            },
            health: HealthConfig { port: health_port },
        })
    }

    /// Reject settings the bot cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            bail!("telegram.bot_token is empty");
        }
        if self.downloads.destination_dir.as_os_str().is_empty() {
            bail!("downloads.destination_dir is empty");
        }
        if self.downloads.max_retries == 0 {
            bail!("downloads.max_retries must be at least 1");
        }
        if self.downloads.status_page_size == 0 {
            bail!("downloads.status_page_size must be at least 1");
        }
        if self.downloads.local_api_dir.is_some() && self.telegram.api_url.is_none() {
            bail!("downloads.local_api_dir requires telegram.api_url (a local Bot API server)");
        }
        if let Some(api_url) = &self.telegram.api_url {
            url::Url::parse(api_url)
                .with_context(|| format!("Invalid telegram.api_url: {}", api_url))?;
        }
        Ok(())
    }
}

impl TelegramConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl DownloadConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_secs(self.initial_retry_delay_secs),
        )
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }
}

fn default_bot_token() -> String {
    std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default()
}

fn default_request_timeout_secs() -> u64 {
    1800
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("telegram-downloader")
}

fn default_max_retries() -> u32 {
    transfer_core::MAX_RETRIES
}

fn default_initial_retry_delay_secs() -> u64 {
    transfer_core::INITIAL_RETRY_DELAY.as_secs()
}

fn default_progress_interval_secs() -> u64 {
    transfer_core::progress::DEFAULT_PROGRESS_INTERVAL.as_secs()
}

fn default_status_page_size() -> usize {
    2
}

fn default_health_port() -> u16 {
    3000
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            port: default_health_port(),
        }
    }
}
