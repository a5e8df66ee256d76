//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.botrelay/config.json`) and environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default capacity of the queue between polling workers and the dispatch worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Top-level relay config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Bots by name.
    #[serde(default)]
    pub bots: BTreeMap<String, BotConfig>,

    /// HTTP ingress. When absent, no HTTP worker is started.
    #[serde(default)]
    pub server: Option<ServerConfig>,

    /// Local endpoint inbound messages are forwarded to.
    #[serde(default)]
    pub delivery: Option<DeliveryConfig>,

    /// Bound of the inbound queue; full queue blocks the pollers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bots: BTreeMap::new(),
            server: None,
            delivery: None,
            queue_capacity: default_queue_capacity(),
            telegram: TelegramConfig::default(),
        }
    }
}

/// One bot account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// Bot token from BotFather. Overridden by BOTRELAY_TOKEN_<NAME> env when set.
    #[serde(default)]
    pub token: Option<String>,
    /// Chat ids the HTTP ingress may send to.
    #[serde(default)]
    pub allowed_users: Vec<i64>,
    /// Skip the allow list entirely.
    #[serde(default)]
    pub allow_all: bool,
}

/// HTTP ingress settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Listen address (default "127.0.0.1:9090").
    #[serde(default = "default_server_bind")]
    pub bind: String,

    /// Bot the ingress sends through. May be omitted when exactly one bot is configured.
    #[serde(default)]
    pub bot: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub write_timeout_secs: u64,
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_server_bind(),
            bot: None,
            read_timeout_secs: default_timeout_secs(),
            write_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Local delivery endpoint for inbound messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConfig {
    pub url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    /// API base URL (for tests or self-hosted Bot API servers). TELEGRAM_API_BASE env overrides.
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_server_bind() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Env var holding the token override for a bot (e.g. "main-bot" -> BOTRELAY_TOKEN_MAIN_BOT).
pub fn token_env_key(bot_name: &str) -> String {
    let suffix: String = bot_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("BOTRELAY_TOKEN_{}", suffix)
}

/// Resolve a bot token: env BOTRELAY_TOKEN_<NAME> overrides config.
pub fn resolve_bot_token(bot_name: &str, bot: &BotConfig) -> Option<String> {
    non_empty_env(&token_env_key(bot_name)).or_else(|| {
        bot.token
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the Telegram API base: env TELEGRAM_API_BASE overrides config.
pub fn resolve_telegram_api_base(config: &Config) -> String {
    non_empty_env("TELEGRAM_API_BASE")
        .or_else(|| config.telegram.api_base.clone())
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|| TELEGRAM_API_BASE.to_string())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("BOTRELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".botrelay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path (BOTRELAY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
