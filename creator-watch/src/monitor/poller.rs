//! The partitioned poller.
//!
//! Every worker owns one partition of the lexicographically ordered watch
//! list and polls exactly one account of it per tick. Partitions are
//! recomputed from a fresh configuration snapshot on every tick, so workers
//! never coordinate with each other.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use profile_scraper::{FailureReason, PageFailure, PageOutcome};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::fetcher::PageFetcher;
use super::partition::{Cursor, group};
use crate::config::{SubscriptionSource, WatchSnapshot};
use crate::credentials::CookieJar;
use crate::notification::{Attachment, DeliveryReport, DiagnosticSink, Dispatcher};
use crate::state::{Change, StateStore, diff};
use crate::stats::StatsStore;

/// Poller tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    pub partitions: usize,
    pub interval: Duration,
    /// Minimum time between two live notifications of the same account.
    pub live_cooldown: Option<Duration>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            partitions: 2,
            interval: Duration::from_millis(3000),
            live_cooldown: None,
        }
    }
}

/// How a polled account fared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// Facts were extracted and applied.
    Success {
        changes: Vec<Change>,
        delivery: DeliveryReport,
    },
    /// Transient condition; retried on a later tick.
    Skipped(FailureReason),
    /// The poll failed. `escalated` is set on the first occurrence of the
    /// reason in a row.
    Failed {
        reason: FailureReason,
        detail: Option<String>,
        escalated: bool,
    },
}

/// Result of one worker tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The worker's partition is empty.
    Idle,
    Polled {
        account: String,
        wrapped: bool,
        result: PollResult,
    },
}

impl TickOutcome {
    /// Terminal progress signal: `.` for success, `!` for a failure or skip,
    /// preceded by the partition digit when the cursor wrapped.
    pub fn signal(&self, partition: usize) -> Option<String> {
        let TickOutcome::Polled {
            wrapped, result, ..
        } = self
        else {
            return None;
        };
        let mark = match result {
            PollResult::Success { .. } => '.',
            PollResult::Skipped(_) | PollResult::Failed { .. } => '!',
        };
        Some(if *wrapped {
            format!("{partition}{mark}")
        } else {
            mark.to_string()
        })
    }

    pub fn account(&self) -> Option<&str> {
        match self {
            TickOutcome::Idle => None,
            TickOutcome::Polled { account, .. } => Some(account),
        }
    }
}

/// Shared services of all poll workers.
pub struct Poller {
    subscriptions: Arc<dyn SubscriptionSource>,
    fetcher: Arc<dyn PageFetcher>,
    cookies: Arc<CookieJar>,
    state: Arc<StateStore>,
    stats: Arc<StatsStore>,
    dispatcher: Dispatcher,
    diagnostics: Arc<dyn DiagnosticSink>,
    settings: PollerSettings,
}

impl Poller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionSource>,
        fetcher: Arc<dyn PageFetcher>,
        cookies: Arc<CookieJar>,
        state: Arc<StateStore>,
        stats: Arc<StatsStore>,
        dispatcher: Dispatcher,
        diagnostics: Arc<dyn DiagnosticSink>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            subscriptions,
            fetcher,
            cookies,
            state,
            stats,
            dispatcher,
            diagnostics,
            settings,
        }
    }

    /// Create the worker owning `partition`.
    pub fn worker(self: &Arc<Self>, partition: usize) -> PartitionWorker {
        PartitionWorker {
            poller: Arc::clone(self),
            partition,
            cursor: Cursor::default(),
        }
    }

    /// Poll `partition` once per interval until `cancel` fires. An in-flight
    /// tick always completes.
    pub async fn run_worker(self: Arc<Self>, partition: usize, cancel: CancellationToken) {
        self.worker(partition).run(cancel).await;
    }

    async fn poll_account(&self, snapshot: &WatchSnapshot, account: &str) -> PollResult {
        let mode = snapshot.poll_mode(account);
        let cookies = self.cookies.current();

        let outcome = match self.fetcher.fetch(account, &cookies).await {
            Ok(page) => {
                let outcome = profile_scraper::extract(&page, mode);
                (outcome, Some(page))
            }
            Err(e) => {
                let failure = PageFailure::with_detail(FailureReason::RequestFailed, e.to_string());
                (PageOutcome::Failure(failure), None)
            }
        };

        match outcome {
            (PageOutcome::Success(facts), _) => {
                let mutation = self.state.update(account, &facts).await;
                if let Err(e) = &mutation.flush {
                    self.report(&format!("Couldn't write to state file: {e}"), None)
                        .await;
                }
                let transition = mutation.value;
                let mut changes = diff(&transition.previous, &transition.current, &facts);
                self.apply_live_cooldown(account, &transition.previous, &mut changes)
                    .await;

                let delivery = match snapshot.subscribers(account) {
                    Some(subscribers) if !changes.is_empty() => {
                        self.dispatcher.deliver(account, &changes, subscribers).await
                    }
                    _ => DeliveryReport::default(),
                };
                if !changes.is_empty() {
                    info!(
                        account,
                        ?mode,
                        changes = ?changes.iter().map(Change::kind).collect::<Vec<_>>(),
                        sent = delivery.sent,
                        failed = delivery.failed,
                        "Account changed"
                    );
                }

                if let Err(e) = self.stats.record_success(account).await {
                    debug!(account, error = %e, "Couldn't record successful poll");
                }
                PollResult::Success { changes, delivery }
            }
            (PageOutcome::Failure(failure), page) => {
                self.handle_failure(account, failure, page).await
            }
        }
    }

    async fn handle_failure(
        &self,
        account: &str,
        failure: PageFailure,
        page: Option<String>,
    ) -> PollResult {
        let PageFailure { reason, detail } = failure;
        if let Err(e) = self
            .stats
            .record_failure(account, reason, detail.as_deref())
            .await
        {
            debug!(account, %reason, error = %e, "Couldn't record failed poll");
        }

        if reason.is_transient() {
            trace!(account, %reason, "Skipping poll");
            return PollResult::Skipped(reason);
        }

        let mutation = self.state.note_failure(account, reason).await;
        let escalated = mutation.value;
        if let Err(e) = &mutation.flush {
            self.report(&format!("Couldn't write to state file: {e}"), None)
                .await;
        }

        if escalated {
            let message = failure_message(account, reason, detail.as_deref());
            let attachment = page
                .filter(|_| reason.is_extraction_step())
                .map(Attachment::html_page);
            self.report(&message, attachment.as_ref()).await;
        } else {
            debug!(account, %reason, "Repeated failure, not escalated");
        }

        PollResult::Failed {
            reason,
            detail,
            escalated,
        }
    }

    async fn apply_live_cooldown(
        &self,
        account: &str,
        previous: &crate::state::AccountState,
        changes: &mut Vec<Change>,
    ) {
        if !changes.contains(&Change::WentLive) {
            return;
        }
        let now = Utc::now();

        if let (Some(cooldown), Some(last)) = (self.settings.live_cooldown, previous.last_went_live_at)
            && let Ok(cooldown) = chrono::Duration::from_std(cooldown)
            && now - last < cooldown
        {
            info!(account, last_live = %last, "Suppressing live notification inside cooldown");
            changes.retain(|change| *change != Change::WentLive);
            return;
        }

        let mutation = self.state.mark_live_announced(account, now).await;
        if let Err(e) = mutation.flush {
            debug!(account, error = %e, "Couldn't persist live announcement time");
        }
    }

    async fn report(&self, message: &str, attachment: Option<&Attachment>) {
        if let Err(e) = self.diagnostics.report(message, attachment).await {
            warn!(error = %e, "Diagnostic sink failed: {}", message);
        }
    }
}

/// Operator-facing text for an escalated failure.
pub fn failure_message(account: &str, reason: FailureReason, detail: Option<&str>) -> String {
    let suffix = detail.map(|d| format!(" ({d})")).unwrap_or_default();
    match reason {
        FailureReason::AccessDenied => format!("Access denied when polling for `@{account}`!"),
        FailureReason::RequestFailed => {
            format!("Request for `@{account}` failed{suffix}.")
        }
        FailureReason::SomethingWentWrong
        | FailureReason::NoContent
        | FailureReason::PageNotAvailable
        | FailureReason::PrivateAccount
        | FailureReason::UnknownErrorDiv => format!(
            "Couldn't retrieve latest uploads for `@{account}`: {}{suffix}",
            reason.label()
        ),
        _ => format!(
            "Couldn't extract the latest upload of `@{account}`: {}{suffix}",
            reason.label()
        ),
    }
}

/// One partition's worker and its private cursor.
pub struct PartitionWorker {
    poller: Arc<Poller>,
    partition: usize,
    cursor: Cursor,
}

impl PartitionWorker {
    /// Run a single poll cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        let snapshot = self.poller.subscriptions.snapshot().await;
        let accounts = snapshot.accounts();
        let mine = group(&accounts, self.poller.settings.partitions, self.partition);

        let Some(step) = self.cursor.advance(mine.len()) else {
            return TickOutcome::Idle;
        };
        let account = mine[step.index].clone();

        let result = self.poller.poll_account(&snapshot, &account).await;
        let outcome = TickOutcome::Polled {
            account,
            wrapped: step.wrapped,
            result,
        };

        if let (Some(signal), Some(account)) = (outcome.signal(self.partition), outcome.account()) {
            trace!(partition = self.partition, account, "{}", signal);
            if let Err(e) = self
                .poller
                .stats
                .record_latest_poll(format!("{signal} @{account}"))
                .await
            {
                debug!(error = %e, "Couldn't record latest poll");
            }
        }
        outcome
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.poller.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(partition = self.partition, "Poll worker started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(partition = self.partition, "Poll worker shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals() {
        let polled = |wrapped, result| TickOutcome::Polled {
            account: "abc".to_string(),
            wrapped,
            result,
        };
        let ok = PollResult::Success {
            changes: Vec::new(),
            delivery: DeliveryReport::default(),
        };

        assert_eq!(TickOutcome::Idle.signal(0), None);
        assert_eq!(polled(false, ok.clone()).signal(1).as_deref(), Some("."));
        assert_eq!(polled(true, ok).signal(1).as_deref(), Some("1."));
        assert_eq!(
            polled(false, PollResult::Skipped(FailureReason::PleaseWait))
                .signal(0)
                .as_deref(),
            Some("!")
        );
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            failure_message("abc", FailureReason::AccessDenied, None),
            "Access denied when polling for `@abc`!"
        );
        assert_eq!(
            failure_message("abc", FailureReason::UnknownErrorDiv, Some("Banned")),
            "Couldn't retrieve latest uploads for `@abc`: Unknown Error Div (Banned)"
        );
        assert_eq!(
            failure_message("abc", FailureReason::UserPostItemList, None),
            "Couldn't extract the latest upload of `@abc`: User Post Item List"
        );
    }
}
