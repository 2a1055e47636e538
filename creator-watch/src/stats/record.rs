use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use profile_scraper::FailureReason;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Failure counters of one account.
///
/// [`FailureReason::UnknownErrorDiv`] is never counted in `by_reason`; its
/// occurrences are keyed by the raw panel text instead.
///
/// On disk this is a single flat map from reason tag to count, where the
/// `unknown-error-div` tag maps to the nested text → count map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FailureMap", into = "FailureMap")]
pub struct FailureCounts {
    pub by_reason: BTreeMap<FailureReason, u64>,
    pub unknown_error_div: BTreeMap<String, u64>,
}

impl FailureCounts {
    pub fn count(&self, reason: FailureReason) -> u64 {
        match reason {
            FailureReason::UnknownErrorDiv => self.unknown_error_div.values().sum(),
            other => self.by_reason.get(&other).copied().unwrap_or(0),
        }
    }

    pub fn total(&self) -> u64 {
        self.by_reason.values().sum::<u64>() + self.unknown_error_div.values().sum::<u64>()
    }

    /// Add another account's counters to this one.
    pub fn absorb(&mut self, other: &FailureCounts) {
        for (reason, count) in &other.by_reason {
            *self.by_reason.entry(*reason).or_default() += count;
        }
        for (text, count) in &other.unknown_error_div {
            *self.unknown_error_div.entry(text.clone()).or_default() += count;
        }
    }
}

/// A value of the persisted failure map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum FailureEntry {
    Count(u64),
    ByText(BTreeMap<String, u64>),
}

type FailureMap = BTreeMap<String, FailureEntry>;

impl From<FailureMap> for FailureCounts {
    fn from(map: FailureMap) -> Self {
        let mut counts = FailureCounts::default();
        for (tag, entry) in map {
            match (tag.parse::<FailureReason>(), entry) {
                (Ok(FailureReason::UnknownErrorDiv), FailureEntry::ByText(texts)) => {
                    counts.unknown_error_div = texts;
                }
                (Ok(reason), FailureEntry::Count(count))
                    if reason != FailureReason::UnknownErrorDiv =>
                {
                    if count > 0 {
                        counts.by_reason.insert(reason, count);
                    }
                }
                _ => warn!(tag = %tag, "Ignoring unrecognised failure counter"),
            }
        }
        counts
    }
}

impl From<FailureCounts> for FailureMap {
    fn from(counts: FailureCounts) -> Self {
        let mut map: FailureMap = counts
            .by_reason
            .into_iter()
            .filter(|(reason, _)| *reason != FailureReason::UnknownErrorDiv)
            .map(|(reason, count)| (reason.as_str().to_string(), FailureEntry::Count(count)))
            .collect();
        map.insert(
            FailureReason::UnknownErrorDiv.as_str().to_string(),
            FailureEntry::ByText(counts.unknown_error_div),
        );
        map
    }
}

/// Poll statistics of one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsRecord {
    pub success: u64,
    pub failure: FailureCounts,
    /// Short description of the last recorded outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_poll: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_poll_at: Option<DateTime<Utc>>,
}

impl StatsRecord {
    pub fn total(&self) -> u64 {
        self.success + self.failure.total()
    }
}

/// Store-wide bookkeeping kept next to the per-account records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsMeta {
    pub last_reset_at: Option<DateTime<Utc>>,
    /// Last poll signal written by any worker.
    pub latest_poll: Option<String>,
}
