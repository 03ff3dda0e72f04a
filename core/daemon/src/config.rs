//! Daemon configuration and on-disk paths.
//!
//! Everything lives under `~/.playwatch` unless `PLAYWATCH_HOME` points
//! elsewhere. A missing config file yields defaults.

use playwatch_daemon_protocol::DEFAULT_LIST_LIMIT;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::detector::DEFAULT_GAME_KEYWORDS;
use crate::error::{DaemonError, IoContext, Result};

const DATA_DIR_NAME: &str = ".playwatch";
const SOCKET_NAME: &str = "daemon.sock";
const CONFIG_NAME: &str = "config.toml";
const INDICATOR_NAME: &str = "indicator.json";

pub const HOME_ENV: &str = "PLAYWATCH_HOME";
pub const MAIL_SENDER_ENV: &str = "PLAYWATCH_MAIL_SENDER";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;
const DEFAULT_HISTORY_LIMIT: usize = DEFAULT_LIST_LIMIT;
const DEFAULT_SUBJECT_PREFIX: &str = "PlayWatch Alert";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub poll_interval_secs: u64,
    pub game_keywords: Vec<String>,
    pub history_limit: usize,
    pub mail: MailConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            game_keywords: DEFAULT_GAME_KEYWORDS
                .iter()
                .map(|keyword| keyword.to_string())
                .collect(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            mail: MailConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub sender: Option<String>,
    pub subject_prefix: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sender: None,
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
        }
    }
}

impl DaemonConfig {
    /// Normalizes user-supplied values: keywords are trimmed and lowercased,
    /// an empty keyword list falls back to the defaults, the poll interval is
    /// at least one second.
    fn normalized(mut self) -> Self {
        let keywords: Vec<String> = self
            .game_keywords
            .iter()
            .map(|keyword| keyword.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        self.game_keywords = if keywords.is_empty() {
            DaemonConfig::default().game_keywords
        } else {
            keywords
        };
        self.poll_interval_secs = self.poll_interval_secs.max(1);
        if self.history_limit == 0 {
            self.history_limit = DEFAULT_HISTORY_LIMIT;
        }
        self.mail.sender = self
            .mail
            .sender
            .map(|sender| sender.trim().to_string())
            .filter(|sender| !sender.is_empty());
        self
    }

    fn apply_env_overrides(mut self) -> Self {
        if let Ok(sender) = env::var(MAIL_SENDER_ENV) {
            let sender = sender.trim();
            if !sender.is_empty() {
                self.mail.sender = Some(sender.to_string());
            }
        }
        self
    }
}

/// Defaults plus environment overrides, for when the config file is unusable.
pub fn fallback_config() -> DaemonConfig {
    DaemonConfig::default().apply_env_overrides()
}

pub fn load_config(path: &Path) -> Result<DaemonConfig> {
    let config = if path.exists() {
        let content = fs_err::read_to_string(path).io_context("Failed to read config")?;
        toml::from_str::<DaemonConfig>(&content).map_err(|err| DaemonError::Config {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?
    } else {
        DaemonConfig::default()
    };
    Ok(config.normalized().apply_env_overrides())
}

pub fn data_dir() -> Result<PathBuf> {
    if let Ok(value) = env::var(HOME_ENV) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    let home = dirs::home_dir().ok_or(DaemonError::HomeNotFound)?;
    Ok(home.join(DATA_DIR_NAME))
}

pub fn socket_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(SOCKET_NAME))
}

pub fn db_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("daemon").join("state.db"))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(CONFIG_NAME))
}

pub fn indicator_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(INDICATOR_NAME))
}
