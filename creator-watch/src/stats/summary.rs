use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use profile_scraper::FailureReason;

use super::{FailureCounts, StatsMeta, StatsRecord};

/// What a summary covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryScope {
    /// Every account with recorded polls.
    All { accounts: usize },
    /// A single account.
    Account(String),
}

/// Aggregated poll statistics, rendered as a chat-friendly message.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSummary {
    pub scope: SummaryScope,
    pub success: u64,
    pub failure: FailureCounts,
    pub last_poll: Option<String>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub meta: StatsMeta,
}

impl StatsSummary {
    pub(super) fn all(records: &BTreeMap<String, StatsRecord>, meta: StatsMeta) -> Self {
        let mut failure = FailureCounts::default();
        let mut success = 0;
        for record in records.values() {
            success += record.success;
            failure.absorb(&record.failure);
        }

        Self {
            scope: SummaryScope::All {
                accounts: records.len(),
            },
            success,
            failure,
            last_poll: None,
            last_poll_at: None,
            meta,
        }
    }

    pub(super) fn account(account: &str, record: Option<StatsRecord>, meta: StatsMeta) -> Self {
        let record = record.unwrap_or_default();
        Self {
            scope: SummaryScope::Account(account.to_string()),
            success: record.success,
            failure: record.failure,
            last_poll: record.last_poll,
            last_poll_at: record.last_poll_at,
            meta,
        }
    }

    pub fn failures(&self) -> u64 {
        self.failure.total()
    }

    pub fn total(&self) -> u64 {
        self.success + self.failures()
    }

    pub fn has_data(&self) -> bool {
        self.total() > 0
    }

    /// Success rate as a percentage, or `None` without any poll.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.success as f64 / total as f64 * 100.0)
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            SummaryScope::All { accounts } => {
                writeln!(f, "**__Polling Stats__**")?;
                writeln!(f, "Currently polling **{accounts}** account/s.")?;
            }
            SummaryScope::Account(account) => {
                writeln!(f, "**__`@{account}`'s Polling Stats__**")?;
            }
        }

        let Some(rate) = self.success_rate() else {
            return write!(f, "no data");
        };

        writeln!(f, "Successful: {}", self.success)?;
        writeln!(f, "Failures: {}", self.failures())?;
        for reason in FailureReason::ALL {
            if reason == FailureReason::UnknownErrorDiv {
                for (text, count) in &self.failure.unknown_error_div {
                    writeln!(f, "- {}: {text}: {count}", reason.label())?;
                }
                continue;
            }
            let count = self.failure.count(reason);
            if count > 0 {
                writeln!(f, "- {}: {count}", reason.label())?;
            }
        }
        writeln!(f, "Total Polls: {}", self.total())?;
        write!(f, "Success Rate: {rate:.2}%")?;

        if let Some(last_poll) = &self.last_poll {
            write!(f, "\nLast Poll: {last_poll}")?;
            if let Some(at) = self.last_poll_at {
                write!(f, " ({})", at.format("%Y-%m-%d %H:%M:%S UTC"))?;
            }
        }
        if let SummaryScope::All { .. } = self.scope {
            if let Some(latest) = &self.meta.latest_poll {
                write!(f, "\nLatest Poll: `{latest}`")?;
            }
        }
        if let Some(reset) = self.meta.last_reset_at {
            write!(f, "\nSince: {}", reset.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        Ok(())
    }
}
