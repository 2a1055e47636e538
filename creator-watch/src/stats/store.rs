use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::Utc;
use profile_scraper::FailureReason;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{StatsMeta, StatsRecord, StatsSummary};
use crate::utils::fs::{read_json, write_json_atomic};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct StatsData {
    records: BTreeMap<String, StatsRecord>,
    meta: StatsMeta,
}

/// Durable poll statistics.
///
/// Per-account records go to `stats.json`; the reset timestamp and the latest
/// poll line go to a sibling meta file so the hot per-tick write stays small.
#[derive(Debug)]
pub struct StatsStore {
    records_path: PathBuf,
    meta_path: PathBuf,
    data: Mutex<StatsData>,
}

impl StatsStore {
    pub async fn load(records_path: impl Into<PathBuf>, meta_path: impl Into<PathBuf>) -> Result<Self> {
        let records_path = records_path.into();
        let meta_path = meta_path.into();

        let records = load_or_default(&records_path).await?;
        let meta = load_or_default(&meta_path).await?;

        Ok(Self {
            records_path,
            meta_path,
            data: Mutex::new(StatsData { records, meta }),
        })
    }

    pub async fn record_success(&self, account: &str) -> Result<()> {
        let mut data = self.data.lock().await;
        let record = data.records.entry(account.to_string()).or_default();
        record.success += 1;
        record.last_poll = Some("success".to_string());
        record.last_poll_at = Some(Utc::now());
        self.flush_records(&data).await
    }

    /// Count a failed poll. [`FailureReason::UnknownErrorDiv`] requires the
    /// panel text as `detail`.
    pub async fn record_failure(
        &self,
        account: &str,
        reason: FailureReason,
        detail: Option<&str>,
    ) -> Result<()> {
        let unknown_key = match (reason, detail) {
            (FailureReason::UnknownErrorDiv, Some(text)) => Some(text.to_string()),
            (FailureReason::UnknownErrorDiv, None) => {
                return Err(Error::validation(
                    "unknown-error-div failures require the panel text",
                ));
            }
            _ => None,
        };

        let mut data = self.data.lock().await;
        let record = data.records.entry(account.to_string()).or_default();
        match unknown_key {
            Some(text) => *record.failure.unknown_error_div.entry(text).or_default() += 1,
            None => *record.failure.by_reason.entry(reason).or_default() += 1,
        }
        record.last_poll = Some(match detail {
            Some(detail) => format!("{}: {detail}", reason.label()),
            None => reason.label(),
        });
        record.last_poll_at = Some(Utc::now());
        self.flush_records(&data).await
    }

    /// Clear every counter and remember when that happened.
    pub async fn reset(&self) -> Result<()> {
        let mut data = self.data.lock().await;
        data.records.clear();
        data.meta.last_reset_at = Some(Utc::now());
        self.flush_records(&data).await?;
        self.flush_meta(&data).await
    }

    pub async fn remove_account(&self, account: &str) -> Result<bool> {
        let mut data = self.data.lock().await;
        if data.records.remove(account).is_none() {
            return Ok(false);
        }
        self.flush_records(&data).await?;
        Ok(true)
    }

    /// Drop the records of every account not in `keep`.
    pub async fn retain_accounts(&self, keep: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut data = self.data.lock().await;
        let removed: Vec<String> = data
            .records
            .keys()
            .filter(|account| !keep.contains(*account))
            .cloned()
            .collect();
        if removed.is_empty() {
            return Ok(removed);
        }
        for account in &removed {
            data.records.remove(account);
        }
        self.flush_records(&data).await?;
        Ok(removed)
    }

    /// Remember the terminal signal of the latest tick of any worker.
    pub async fn record_latest_poll(&self, line: impl Into<String>) -> Result<()> {
        let mut data = self.data.lock().await;
        data.meta.latest_poll = Some(line.into());
        self.flush_meta(&data).await
    }

    /// Summarise every account, or only `account` when given.
    pub async fn summarize(&self, account: Option<&str>) -> StatsSummary {
        match account.filter(|a| !a.is_empty()) {
            Some(account) => {
                let (record, meta) = {
                    let data = self.data.lock().await;
                    (data.records.get(account).cloned(), data.meta.clone())
                };
                StatsSummary::account(account, record, meta)
            }
            None => {
                let (records, meta) = {
                    let data = self.data.lock().await;
                    (data.records.clone(), data.meta.clone())
                };
                StatsSummary::all(&records, meta)
            }
        }
    }

    pub async fn record(&self, account: &str) -> Option<StatsRecord> {
        self.data.lock().await.records.get(account).cloned()
    }

    async fn flush_records(&self, data: &StatsData) -> Result<()> {
        write_json_atomic(&self.records_path, &data.records)
            .await
            .inspect_err(|e| warn!(path = %self.records_path.display(), error = %e, "Failed to persist stats"))
    }

    async fn flush_meta(&self, data: &StatsData) -> Result<()> {
        write_json_atomic(&self.meta_path, &data.meta)
            .await
            .inspect_err(|e| warn!(path = %self.meta_path.display(), error = %e, "Failed to persist stats meta"))
    }
}

async fn load_or_default<T>(path: &std::path::Path) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match read_json(path).await {
        Ok(Some(value)) => Ok(value),
        Ok(None) => {
            debug!(path = %path.display(), "No stats file, starting empty");
            Ok(T::default())
        }
        Err(Error::Serialization(e)) => {
            warn!(path = %path.display(), error = %e, "Stats file is corrupt, starting empty");
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}
