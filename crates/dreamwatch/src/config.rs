use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::stats::ReportDay;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub dreamhack: DreamhackConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DiscordConfig {
    pub webhook_url: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            webhook_url: "YOUR_DISCORD_WEBHOOK_URL".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DreamhackConfig {
    #[serde(default)]
    pub user_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_site_base")]
    pub site_base: String,
}

impl Default for DreamhackConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            api_base: default_api_base(),
            site_base: default_site_base(),
        }
    }
}

fn default_api_base() -> String {
    "https://dreamhack.io/api/v1".to_string()
}

fn default_site_base() -> String {
    "https://dreamhack.io".to_string()
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WatchConfig {
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "interval_seconds", default = "default_interval")]
    pub interval: Duration,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub report_day: ReportDay,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "request_timeout_seconds", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            timezone: default_timezone(),
            report_day: ReportDay::default(),
            state_dir: default_state_dir(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(120)
}

fn default_timezone() -> String {
    "Asia/Tokyo".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

/// 起動時に検出される設定エラー。いずれも起動を中止する。
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("webhook URL is missing or invalid: {0:?}")]
    InvalidWebhookUrl(String),
    #[error("target user id is not set")]
    MissingUserId,
    #[error("check interval must be a positive integer (seconds): {0:?}")]
    InvalidInterval(String),
    #[error("request timeout must be a positive integer (seconds)")]
    InvalidRequestTimeout,
    #[error("timezone is not a valid IANA identifier: {0:?}")]
    InvalidTimezone(String),
    #[error("API base URL is invalid: {0:?}")]
    InvalidApiBase(String),
    #[error("site base URL is invalid: {0:?}")]
    InvalidSiteBase(String),
}

pub const ENV_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";
pub const ENV_USER_ID: &str = "TARGET_USER_ID";
pub const ENV_INTERVAL: &str = "CHECK_INTERVAL";
pub const ENV_TIMEZONE: &str = "TIMEZONE";
pub const ENV_API_HOST: &str = "API_HOST";

impl Config {
    /// 環境変数の値で設定を上書きする。
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_WEBHOOK_URL) {
            self.discord.webhook_url = url;
        }
        if let Some(user_id) = lookup(ENV_USER_ID) {
            self.dreamhack.user_id = user_id;
        }
        if let Some(raw) = lookup(ENV_INTERVAL) {
            let seconds: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidInterval(raw.clone()))?;
            self.watch.interval = Duration::from_secs(seconds);
        }
        if let Some(timezone) = lookup(ENV_TIMEZONE) {
            self.watch.timezone = timezone;
        }
        if let Some(api_base) = lookup(ENV_API_HOST) {
            self.dreamhack.api_base = api_base;
        }
        Ok(())
    }

    /// 必須項目と値の妥当性を検証する。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.discord.webhook_url) {
            return Err(ConfigError::InvalidWebhookUrl(
                self.discord.webhook_url.clone(),
            ));
        }
        if self.dreamhack.user_id.trim().is_empty() {
            return Err(ConfigError::MissingUserId);
        }
        if self.watch.interval.is_zero() {
            return Err(ConfigError::InvalidInterval("0".to_string()));
        }
        if self.watch.request_timeout.is_zero() {
            return Err(ConfigError::InvalidRequestTimeout);
        }
        if self.watch.timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::InvalidTimezone(self.watch.timezone.clone()));
        }
        if !is_http_url(&self.dreamhack.api_base) {
            return Err(ConfigError::InvalidApiBase(self.dreamhack.api_base.clone()));
        }
        if !is_http_url(&self.dreamhack.site_base) {
            return Err(ConfigError::InvalidSiteBase(
                self.dreamhack.site_base.clone(),
            ));
        }
        Ok(())
    }
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// TOML の設定ファイルを読み込む。環境変数の上書きと検証は行わない。
pub fn open_config(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse configuration file: {}", path.display()))
}

/// 設定ファイル（存在すれば）と環境変数から設定を読み込み、検証する。
pub fn load_config<P, F>(path: P, lookup: F) -> Result<Config>
where
    P: AsRef<Path>,
    F: Fn(&str) -> Option<String>,
{
    let path = path.as_ref();
    let mut config = if path.exists() {
        open_config(path)?
    } else {
        tracing::info!(path = ?path, "Configuration file not found, using defaults and environment");
        Config::default()
    };

    config
        .apply_env(lookup)
        .context("Invalid environment override")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// `--init` 用の設定ファイルの雛形を書き出す。既存のファイルは上書きしない。
pub fn write_default_config(path: &Path) -> Result<()> {
    let template = Config {
        dreamhack: DreamhackConfig {
            user_id: "YOUR_DREAMHACK_USER_ID".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };
    let content =
        toml::to_string_pretty(&template).context("Failed to serialize configuration")?;

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            bail!("Configuration file already exists: {}", path.display())
        }
        Err(e) => {
            return Err(e).with_context(|| {
                format!("Failed to create configuration file: {}", path.display())
            });
        }
    };
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write configuration file: {}", path.display()))
}
