//! Service wiring: builds every store and adapter from [`AppConfig`] and runs
//! the poll workers next to the maintenance tasks.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{AppConfig, LOG_CHANNEL_FILE, SubscriptionSource, SubscriptionStore, TOKEN_FILE};
use crate::credentials::{CookieJar, resolve_secret};
use crate::monitor::{HttpPageFetcher, Maintenance, PageFetcher, Poller, PollerSettings};
use crate::notification::channels::{
    DiagnosticReporter, DiscordClient, DiscordDirectMessages, DiscordLogChannel, LogSink,
};
use crate::notification::{AlarmHook, CommandAlarm, DiagnosticSink, Dispatcher, NotificationSink};
use crate::state::StateStore;
use crate::stats::StatsStore;
use crate::utils::fs::ensure_dir_all_with_op;
use crate::utils::http_client::{build_api_client, build_page_client};
use crate::Result;

/// A fully wired service, ready to run.
pub struct App {
    config: AppConfig,
    poller: Arc<Poller>,
    maintenance: Maintenance,
}

impl App {
    pub async fn build(config: AppConfig) -> Result<Self> {
        ensure_dir_all_with_op("creating data directory", config.data_dir()).await?;

        let subscriptions = Arc::new(SubscriptionStore::load(config.config_path()).await?);
        let state = Arc::new(StateStore::load(config.state_path()).await?);
        let stats = Arc::new(StatsStore::load(config.stats_path(), config.stats_meta_path()).await?);
        let cookies = Arc::new(CookieJar::load(config.cookie_path()).await?);

        let token = resolve_secret(
            config.discord_bot_token.clone(),
            &config.data_file(TOKEN_FILE),
        )
        .await?;
        let log_channel_id = resolve_secret(
            config.discord_log_channel.clone(),
            &config.data_file(LOG_CHANNEL_FILE),
        )
        .await?;

        let (sink, log_channel): (Arc<dyn NotificationSink>, Option<DiscordLogChannel>) =
            match token {
                Some(token) => {
                    let discord = DiscordClient::new(build_api_client(config.request_timeout)?, token);
                    let log_channel = log_channel_id.map(|id| DiscordLogChannel::new(discord.clone(), id));
                    (Arc::new(DiscordDirectMessages::new(discord)), log_channel)
                }
                None => {
                    warn!("No Discord bot token configured; notifications only go to the log");
                    (Arc::new(LogSink), None)
                }
            };
        if log_channel.is_none() {
            info!("No log channel configured; diagnostics only go to the log");
        }
        let diagnostics: Arc<dyn DiagnosticSink> =
            Arc::new(DiagnosticReporter::new(config.data_dir(), log_channel));

        let alarm = config
            .alarm_command
            .clone()
            .map(|command| Arc::new(CommandAlarm::new(command)) as Arc<dyn AlarmHook>);
        let fetcher: Arc<dyn PageFetcher> =
            Arc::new(HttpPageFetcher::new(build_page_client(config.request_timeout)?));

        let subscription_source: Arc<dyn SubscriptionSource> = subscriptions;
        let poller = Arc::new(Poller::new(
            subscription_source.clone(),
            fetcher,
            cookies.clone(),
            state.clone(),
            stats.clone(),
            Dispatcher::new(sink, alarm),
            diagnostics.clone(),
            PollerSettings {
                partitions: config.partitions,
                interval: config.poll_interval,
                live_cooldown: config.live_cooldown,
            },
        ));
        let maintenance = Maintenance {
            subscriptions: subscription_source,
            cookies,
            state,
            stats,
            diagnostics,
        };

        Ok(Self {
            config,
            poller,
            maintenance,
        })
    }

    /// Run until `cancel` fires, then wait for every task to finish its
    /// current cycle.
    pub async fn run(self, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();

        for partition in 0..self.config.partitions {
            tasks.spawn(Arc::clone(&self.poller).run_worker(partition, cancel.child_token()));
        }
        tasks.spawn(
            self.maintenance
                .clone()
                .run_cookie_reload(self.config.cookie_reload_interval, cancel.child_token()),
        );
        tasks.spawn(
            self.maintenance
                .clone()
                .run_cleanup(self.config.cleanup_interval, cancel.child_token()),
        );

        info!(
            partitions = self.config.partitions,
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "creator-watch running"
        );

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Service task ended abnormally");
            }
        }
        info!("All service tasks stopped");
    }
}
