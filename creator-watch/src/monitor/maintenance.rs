//! Periodic housekeeping next to the poll workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SubscriptionSource;
use crate::credentials::CookieJar;
use crate::notification::DiagnosticSink;
use crate::state::StateStore;
use crate::stats::StatsStore;

/// Re-read the cookie file. A change is announced on the diagnostic sink.
pub async fn reload_cookies(cookies: &CookieJar, diagnostics: &dyn DiagnosticSink) -> bool {
    match cookies.reload().await {
        Ok(true) => {
            info!("Refreshed cookies");
            if let Err(e) = diagnostics.report("Refreshed cookies.", None).await {
                warn!(error = %e, "Couldn't announce cookie refresh");
            }
            true
        }
        Ok(false) => false,
        Err(e) => {
            warn!(error = %e, "Could not read cookies, keeping the previous ones");
            false
        }
    }
}

/// Accounts removed by a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub state_removed: Vec<String>,
    pub stats_removed: Vec<String>,
}

/// Drop state and stats of accounts that are no longer configured.
///
/// A poll of a just-removed account racing with the sweep may re-create its
/// record; the next sweep removes it again.
pub async fn sweep_stale_accounts(
    subscriptions: &dyn SubscriptionSource,
    state: &StateStore,
    stats: &StatsStore,
) -> SweepReport {
    let watched = subscriptions.snapshot().await.account_set();

    let mutation = state.retain_accounts(&watched).await;
    if let Err(e) = &mutation.flush {
        warn!(error = %e, "Couldn't persist state after cleanup");
    }
    let stats_removed = match stats.retain_accounts(&watched).await {
        Ok(removed) => removed,
        Err(e) => {
            warn!(error = %e, "Couldn't persist stats after cleanup");
            Vec::new()
        }
    };

    let report = SweepReport {
        state_removed: mutation.value,
        stats_removed,
    };
    if !report.state_removed.is_empty() || !report.stats_removed.is_empty() {
        info!(
            state = ?report.state_removed,
            stats = ?report.stats_removed,
            "Removed unwatched accounts"
        );
    }
    report
}

/// Handles of the maintenance services.
#[derive(Clone)]
pub struct Maintenance {
    pub subscriptions: Arc<dyn SubscriptionSource>,
    pub cookies: Arc<CookieJar>,
    pub state: Arc<StateStore>,
    pub stats: Arc<StatsStore>,
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

impl Maintenance {
    pub async fn run_cookie_reload(self, period: Duration, cancel: CancellationToken) {
        let mut interval = periodic(period);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Cookie reload task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    reload_cookies(&self.cookies, self.diagnostics.as_ref()).await;
                }
            }
        }
    }

    pub async fn run_cleanup(self, period: Duration, cancel: CancellationToken) {
        let mut interval = periodic(period);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("State cleanup task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    sweep_stale_accounts(self.subscriptions.as_ref(), &self.state, &self.stats).await;
                }
            }
        }
    }
}

/// Interval whose first tick fires after one full period.
fn periodic(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
