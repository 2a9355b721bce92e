//! CLI configuration at `~/.zalo/config.toml`.
//!
//! Account defaults and listener knobs. CLI flags always override config
//! file values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use zalo_client::{ClientConfig, DispatchConfig, PollConfig, SessionStore};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub listen: ListenConfig,
}

/// Account defaults used by `session import` and every request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountConfig {
    /// Device id the session is bound to (empty = none).
    #[serde(default)]
    pub imei: String,

    /// User agent to present instead of the built-in browser string.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Session snapshot path; defaults to `~/.zalo/session.json`.
    #[serde(default)]
    pub session_file: Option<String>,
}

/// Poll loop and dispatcher settings for `zalo listen`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Seconds between fetches.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Command prefix.
    #[serde(default)]
    pub prefix: String,

    /// Maximum handlers running at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Messages older than this many seconds are ignored.
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            prefix: String::new(),
            max_concurrency: default_max_concurrency(),
            lookback_secs: default_lookback_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    1
}

fn default_max_concurrency() -> usize {
    64
}

fn default_lookback_secs() -> u64 {
    10
}

/// `~/.zalo/config.toml`.
pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".zalo")
        .join("config.toml")
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Where the session snapshot lives.
    pub fn session_store(&self) -> Result<SessionStore> {
        match &self.account.session_file {
            Some(path) => Ok(SessionStore::new(expand_home(path))),
            None => SessionStore::default_location().context("failed to locate session file"),
        }
    }

    /// Library settings derived from the `[listen]` section.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            poll: PollConfig {
                interval: Duration::from_secs(self.listen.interval_secs.max(1)),
                lookback: Duration::from_secs(self.listen.lookback_secs),
                ..Default::default()
            },
            dispatch: DispatchConfig {
                max_concurrency: self.listen.max_concurrency,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().unwrap_or_default().join(rest),
        None => PathBuf::from(path),
    }
}
