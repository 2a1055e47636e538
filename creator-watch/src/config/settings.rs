//! Process settings read from the environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

pub const CONFIG_FILE: &str = "config.json";
pub const STATE_FILE: &str = "state.json";
pub const STATS_FILE: &str = "stats.json";
pub const STATS_META_FILE: &str = "stats_meta.json";
pub const COOKIE_FILE: &str = "cookie.txt";
pub const ERROR_PAGE_FILE: &str = "error.html";
/// Optional log filter directive, re-read on SIGHUP.
pub const LOG_FILTER_FILE: &str = "log_filter.txt";
pub const TOKEN_FILE: &str = "token.txt";
pub const LOG_CHANNEL_FILE: &str = "log_channel.txt";

/// Runtime settings of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub partitions: usize,
    pub poll_interval: Duration,
    pub cookie_reload_interval: Duration,
    pub cleanup_interval: Duration,
    /// `None` leaves the transport default in place.
    pub request_timeout: Option<Duration>,
    /// `None` disables the live-notification cooldown.
    pub live_cooldown: Option<Duration>,
    pub alarm_command: Option<String>,
    pub discord_bot_token: Option<String>,
    pub discord_log_channel: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            log_dir: PathBuf::from("logs"),
            partitions: 2,
            poll_interval: Duration::from_millis(3000),
            cookie_reload_interval: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(60),
            request_timeout: Some(Duration::from_secs(30)),
            live_cooldown: None,
            alarm_command: None,
            discord_bot_token: None,
            discord_log_channel: None,
        }
    }
}

impl AppConfig {
    /// Create the settings from environment variables.
    ///
    /// Environment variables:
    /// - `CREATOR_WATCH_DATA_DIR`: directory holding config, state and stats files (default: `.`)
    /// - `CREATOR_WATCH_LOG_DIR`: rolling log directory (default: `logs`)
    /// - `CREATOR_WATCH_PARTITIONS`: number of poll workers (default: 2)
    /// - `CREATOR_WATCH_POLL_INTERVAL_MS`: tick of every worker (default: 3000)
    /// - `CREATOR_WATCH_COOKIE_RELOAD_SECS`: cookie reload period (default: 5)
    /// - `CREATOR_WATCH_CLEANUP_SECS`: stale-state sweep period (default: 60)
    /// - `CREATOR_WATCH_REQUEST_TIMEOUT_SECS`: fetch timeout, 0 for none (default: 30)
    /// - `CREATOR_WATCH_LIVE_COOLDOWN_SECS`: live notification cooldown, 0 for none (default: 0)
    /// - `CREATOR_WATCH_ALARM_COMMAND`: shell command run for alarm subscribers
    /// - `DISCORD_BOT_TOKEN` / `DISCORD_LOG_CHANNEL`: delivery credentials
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let partitions = parse_var(&var, "CREATOR_WATCH_PARTITIONS", defaults.partitions)?;
        if partitions == 0 {
            return Err(Error::config("CREATOR_WATCH_PARTITIONS must be at least 1"));
        }

        let poll_interval_ms = parse_var(&var, "CREATOR_WATCH_POLL_INTERVAL_MS", 3000u64)?;
        if poll_interval_ms == 0 {
            return Err(Error::config("CREATOR_WATCH_POLL_INTERVAL_MS must be positive"));
        }

        let cookie_reload_secs = parse_var(&var, "CREATOR_WATCH_COOKIE_RELOAD_SECS", 5u64)?;
        let cleanup_secs = parse_var(&var, "CREATOR_WATCH_CLEANUP_SECS", 60u64)?;
        if cookie_reload_secs == 0 || cleanup_secs == 0 {
            return Err(Error::config("maintenance periods must be positive"));
        }

        let request_timeout_secs = parse_var(&var, "CREATOR_WATCH_REQUEST_TIMEOUT_SECS", 30u64)?;
        let live_cooldown_secs = parse_var(&var, "CREATOR_WATCH_LIVE_COOLDOWN_SECS", 0u64)?;

        Ok(Self {
            data_dir: var("CREATOR_WATCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            log_dir: var("CREATOR_WATCH_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            partitions,
            poll_interval: Duration::from_millis(poll_interval_ms),
            cookie_reload_interval: Duration::from_secs(cookie_reload_secs),
            cleanup_interval: Duration::from_secs(cleanup_secs),
            request_timeout: (request_timeout_secs > 0)
                .then(|| Duration::from_secs(request_timeout_secs)),
            live_cooldown: (live_cooldown_secs > 0).then(|| Duration::from_secs(live_cooldown_secs)),
            alarm_command: var("CREATOR_WATCH_ALARM_COMMAND"),
            discord_bot_token: var("DISCORD_BOT_TOKEN").map(|v| v.trim().to_string()),
            discord_log_channel: var("DISCORD_LOG_CHANNEL").map(|v| v.trim().to_string()),
        })
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_file(CONFIG_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_file(STATE_FILE)
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_file(STATS_FILE)
    }

    pub fn stats_meta_path(&self) -> PathBuf {
        self.data_file(STATS_META_FILE)
    }

    pub fn cookie_path(&self) -> PathBuf {
        self.data_file(COOKIE_FILE)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn parse_var<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("invalid {key} value {raw:?}: {e}"))),
        None => Ok(default),
    }
}
