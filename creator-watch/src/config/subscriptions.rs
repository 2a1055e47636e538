//! Subscription configuration: who watches which account, and how.
//!
//! `config.json` maps account → subscriber id → [`Preferences`]. The poller
//! only ever sees point-in-time [`WatchSnapshot`] copies; the mutators below
//! are what a chat front end calls.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use profile_scraper::PollMode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::utils::fs::{read_json, write_json_atomic};
use crate::{Error, Result};

/// Notification preferences of one subscriber for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// New uploads and removed videos.
    pub videos: bool,
    /// Live streams.
    pub lives: bool,
    /// Reachability only.
    pub monitor: bool,
    /// Caption allow-list for new uploads; empty means everything.
    #[serde(alias = "filter", skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
    /// Run the local alarm hook when the account goes live.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub alarm: bool,
}

impl Preferences {
    pub fn is_monitor_only(&self) -> bool {
        self.monitor && !self.videos && !self.lives
    }

    /// Resolve a monitor flag set next to content flags, as a hand-edited
    /// file can contain. Content notifications win, as if `videos`/`lives`
    /// had been enabled last. Returns whether anything changed.
    pub fn normalize(&mut self) -> bool {
        if self.monitor && (self.videos || self.lives) {
            self.monitor = false;
            return true;
        }
        false
    }

    /// Whether a new upload with `caption` passes the allow-list.
    ///
    /// Matching is case-sensitive and word-bounded: a phrase only matches
    /// where it is not glued to further letters or digits.
    pub fn accepts_caption(&self, caption: &str) -> bool {
        self.filters.is_empty()
            || self
                .filters
                .iter()
                .any(|phrase| contains_phrase(caption, phrase))
    }

    /// Short description of what the subscriber is told about.
    pub fn describe(&self) -> &'static str {
        match (self.videos, self.lives, self.monitor) {
            (true, true, _) => "videos and lives",
            (true, false, _) => "videos",
            (false, true, _) => "lives",
            (false, false, true) => "availability",
            (false, false, false) => "nothing",
        }
    }
}

/// A boolean preference that can be toggled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Setting {
    Videos,
    Lives,
    Monitor,
    Alarm,
}

impl Setting {
    fn apply(self, prefs: &mut Preferences, enabled: bool) {
        match self {
            Setting::Videos => prefs.videos = enabled,
            Setting::Lives => prefs.lives = enabled,
            Setting::Monitor => prefs.monitor = enabled,
            Setting::Alarm => prefs.alarm = enabled,
        }
        if !enabled {
            return;
        }
        // Monitoring excludes content notifications for the same pair.
        match self {
            Setting::Monitor => {
                prefs.videos = false;
                prefs.lives = false;
            }
            Setting::Videos | Setting::Lives => prefs.monitor = false,
            Setting::Alarm => {}
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Setting::Videos => "videos",
            Setting::Lives => "lives",
            Setting::Monitor => "monitor",
            Setting::Alarm => "alarm",
        })
    }
}

/// Subscriber id → preferences.
pub type Subscribers = BTreeMap<String, Preferences>;

/// Point-in-time copy of the subscription configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchSnapshot {
    accounts: BTreeMap<String, Subscribers>,
}

impl WatchSnapshot {
    pub fn new(accounts: BTreeMap<String, Subscribers>) -> Self {
        Self { accounts }
    }

    /// Watched accounts in lexicographic order.
    pub fn accounts(&self) -> Vec<String> {
        self.accounts.keys().cloned().collect()
    }

    pub fn account_set(&self) -> BTreeSet<String> {
        self.accounts.keys().cloned().collect()
    }

    pub fn subscribers(&self, account: &str) -> Option<&Subscribers> {
        self.accounts.get(account)
    }

    /// Monitor mode iff every subscriber of the account only monitors it.
    pub fn poll_mode(&self, account: &str) -> PollMode {
        match self.accounts.get(account) {
            Some(subs) if !subs.is_empty() && subs.values().all(Preferences::is_monitor_only) => {
                PollMode::Monitor
            }
            _ => PollMode::Content,
        }
    }
}

/// Source of the watch list.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// A consistent copy of the current configuration.
    async fn snapshot(&self) -> WatchSnapshot;
}

#[async_trait]
impl SubscriptionSource for WatchSnapshot {
    async fn snapshot(&self) -> WatchSnapshot {
        self.clone()
    }
}

/// `config.json`-backed subscription configuration.
#[derive(Debug)]
pub struct SubscriptionStore {
    path: PathBuf,
    config: Mutex<BTreeMap<String, Subscribers>>,
}

impl SubscriptionStore {
    /// Load the configuration. A missing file starts an empty watch list; an
    /// unreadable one is a startup error.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut config = match read_json::<BTreeMap<String, Subscribers>>(&path).await {
            Ok(Some(config)) => {
                info!(path = %path.display(), accounts = config.len(), "Loaded subscription config");
                config
            }
            Ok(None) => {
                warn!(path = %path.display(), "No subscription config, watching nothing");
                BTreeMap::new()
            }
            Err(e) => {
                return Err(Error::config(format!(
                    "couldn't read {}: {e}",
                    path.display()
                )));
            }
        };

        let mut normalized = 0usize;
        for (account, subscribers) in config.iter_mut() {
            for (subscriber, prefs) in subscribers.iter_mut() {
                if prefs.normalize() {
                    warn!(
                        account = %account,
                        subscriber = %subscriber,
                        "Monitor is exclusive with videos/lives; keeping videos/lives"
                    );
                    normalized += 1;
                }
            }
        }
        if normalized > 0
            && let Err(e) = write_json_atomic(&path, &config).await
        {
            warn!(path = %path.display(), error = %e, "Couldn't persist normalized subscription config");
        }

        Ok(Self {
            path,
            config: Mutex::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Toggle `setting` for (`account`, `subscriber`), creating both as needed.
    pub async fn update_setting(
        &self,
        account: &str,
        subscriber: &str,
        setting: Setting,
        enabled: bool,
    ) -> Result<Preferences> {
        validate_account(account)?;
        let mut config = self.config.lock().await;
        let prefs = config
            .entry(account.to_string())
            .or_default()
            .entry(subscriber.to_string())
            .or_default();
        setting.apply(prefs, enabled);
        let updated = prefs.clone();
        debug!(account, subscriber, %setting, enabled, "Updated subscription setting");
        self.flush(&config).await?;
        Ok(updated)
    }

    /// Replace the caption allow-list of (`account`, `subscriber`).
    pub async fn set_filters(
        &self,
        account: &str,
        subscriber: &str,
        filters: Vec<String>,
    ) -> Result<Preferences> {
        validate_account(account)?;
        let filters: Vec<String> = filters.into_iter().filter(|f| !f.is_empty()).collect();
        let mut config = self.config.lock().await;
        let prefs = config
            .entry(account.to_string())
            .or_default()
            .entry(subscriber.to_string())
            .or_default();
        prefs.filters = filters;
        let updated = prefs.clone();
        self.flush(&config).await?;
        Ok(updated)
    }

    /// Remove a subscriber from an account. The account disappears with its
    /// last subscriber. Returns whether anything was removed.
    pub async fn delete_subscriber(&self, account: &str, subscriber: &str) -> Result<bool> {
        let mut config = self.config.lock().await;
        let Some(subs) = config.get_mut(account) else {
            return Ok(false);
        };
        if subs.remove(subscriber).is_none() {
            return Ok(false);
        }
        if subs.is_empty() {
            config.remove(account);
        }
        self.flush(&config).await?;
        Ok(true)
    }

    /// Every account `subscriber` follows, with their preferences.
    pub async fn accounts_for_subscriber(&self, subscriber: &str) -> BTreeMap<String, Preferences> {
        let config = self.config.lock().await;
        config
            .iter()
            .filter_map(|(account, subs)| {
                subs.get(subscriber)
                    .map(|prefs| (account.clone(), prefs.clone()))
            })
            .collect()
    }

    pub async fn preferences(&self, account: &str, subscriber: &str) -> Option<Preferences> {
        let config = self.config.lock().await;
        config.get(account)?.get(subscriber).cloned()
    }

    async fn flush(&self, config: &BTreeMap<String, Subscribers>) -> Result<()> {
        write_json_atomic(&self.path, config).await
    }
}

#[async_trait]
impl SubscriptionSource for SubscriptionStore {
    async fn snapshot(&self) -> WatchSnapshot {
        WatchSnapshot::new(self.config.lock().await.clone())
    }
}

fn contains_phrase(text: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    text.match_indices(phrase).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn validate_account(account: &str) -> Result<()> {
    let valid = !account.is_empty()
        && account
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid account name {account:?}")))
    }
}
