//! Configuration: process settings and the subscription store.

mod settings;
mod subscriptions;

pub use settings::{
    AppConfig, CONFIG_FILE, COOKIE_FILE, ERROR_PAGE_FILE, LOG_CHANNEL_FILE, LOG_FILTER_FILE,
    STATE_FILE, STATS_FILE, STATS_META_FILE, TOKEN_FILE,
};
pub use subscriptions::{
    Preferences, Setting, SubscriptionSource, SubscriptionStore, Subscribers, WatchSnapshot,
};
