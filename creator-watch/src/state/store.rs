//! Durable account state store.
//!
//! The whole account map lives in memory behind one async mutex and is
//! written back to `state.json` after every mutation. The lock is held across
//! the in-memory change and the flush, never across network I/O.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use profile_scraper::{FailureReason, PageFacts};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::AccountState;
use crate::Result;
use crate::utils::fs::{read_json, write_json_atomic};

/// Result of a store mutation.
///
/// The in-memory change always takes effect; `flush` reports whether it also
/// reached disk.
#[derive(Debug)]
#[must_use]
pub struct Mutation<T> {
    pub value: T,
    pub flush: Result<()>,
}

impl<T> Mutation<T> {
    pub fn is_durable(&self) -> bool {
        self.flush.is_ok()
    }
}

/// The state of an account before and after an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub previous: AccountState,
    pub current: AccountState,
}

/// Owner of every [`AccountState`].
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    accounts: Mutex<BTreeMap<String, AccountState>>,
}

impl StateStore {
    /// Load the store from `path`.
    ///
    /// A missing file yields an empty store. A corrupt file is logged and
    /// replaced on the next flush.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let accounts = match read_json::<BTreeMap<String, AccountState>>(&path).await {
            Ok(Some(accounts)) => {
                info!(path = %path.display(), accounts = accounts.len(), "Loaded account state");
                accounts
            }
            Ok(None) => {
                debug!(path = %path.display(), "No state file, starting empty");
                BTreeMap::new()
            }
            Err(crate::Error::Serialization(e)) => {
                warn!(path = %path.display(), error = %e, "State file is corrupt, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            path,
            accounts: Mutex::new(accounts),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply a successful poll to `account`, creating the record if needed.
    pub async fn update(&self, account: &str, facts: &PageFacts) -> Mutation<Transition> {
        let mut accounts = self.accounts.lock().await;
        let previous = accounts.get(account).cloned().unwrap_or_default();
        let current = previous.advance(facts);
        accounts.insert(account.to_string(), current.clone());
        let flush = self.flush(&accounts).await;

        Mutation {
            value: Transition { previous, current },
            flush,
        }
    }

    /// Record a failed poll. The value is `true` when the failure should be
    /// escalated.
    pub async fn note_failure(&self, account: &str, reason: FailureReason) -> Mutation<bool> {
        let mut accounts = self.accounts.lock().await;
        let state = accounts.entry(account.to_string()).or_default();
        let escalate = state.note_failure(reason);
        let flush = if escalate {
            self.flush(&accounts).await
        } else {
            Ok(())
        };

        Mutation {
            value: escalate,
            flush,
        }
    }

    /// Remember when a live notification was last sent for `account`.
    pub async fn mark_live_announced(&self, account: &str, at: DateTime<Utc>) -> Mutation<()> {
        let mut accounts = self.accounts.lock().await;
        let flush = match accounts.get_mut(account) {
            Some(state) => {
                state.last_went_live_at = Some(at);
                self.flush(&accounts).await
            }
            None => Ok(()),
        };

        Mutation { value: (), flush }
    }

    /// Forget `account`. The value is the removed record, if any.
    pub async fn remove(&self, account: &str) -> Mutation<Option<AccountState>> {
        let mut accounts = self.accounts.lock().await;
        let removed = accounts.remove(account);
        let flush = if removed.is_some() {
            self.flush(&accounts).await
        } else {
            Ok(())
        };

        Mutation {
            value: removed,
            flush,
        }
    }

    /// Drop every account not in `keep`. The value lists the removed accounts.
    pub async fn retain_accounts(&self, keep: &BTreeSet<String>) -> Mutation<Vec<String>> {
        let mut accounts = self.accounts.lock().await;
        let removed: Vec<String> = accounts
            .keys()
            .filter(|account| !keep.contains(*account))
            .cloned()
            .collect();
        for account in &removed {
            accounts.remove(account);
        }
        let flush = if removed.is_empty() {
            Ok(())
        } else {
            self.flush(&accounts).await
        };

        Mutation {
            value: removed,
            flush,
        }
    }

    pub async fn get(&self, account: &str) -> Option<AccountState> {
        self.accounts.lock().await.get(account).cloned()
    }

    pub async fn accounts(&self) -> Vec<String> {
        self.accounts.lock().await.keys().cloned().collect()
    }

    /// Copy of the full account map.
    pub async fn snapshot(&self) -> BTreeMap<String, AccountState> {
        self.accounts.lock().await.clone()
    }

    async fn flush(&self, accounts: &BTreeMap<String, AccountState>) -> Result<()> {
        let result = write_json_atomic(&self.path, accounts).await;
        if let Err(e) = &result {
            warn!(path = %self.path.display(), error = %e, "Failed to persist account state");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use profile_scraper::ContentFacts;

    use super::*;

    fn content(video_id: i64, is_live: bool) -> PageFacts {
        PageFacts::Content(ContentFacts {
            video_id,
            caption: "caption".to_string(),
            is_live,
        })
    }

    #[tokio::test]
    async fn test_update_returns_previous_and_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        let store = StateStore::load(&path).await.unwrap();

        let first = store.update("abc", &content(100, false)).await;
        assert!(first.is_durable());
        assert_eq!(first.value.previous, AccountState::default());
        assert_eq!(first.value.current.latest_video_id, 100);

        let second = store.update("abc", &content(105, true)).await;
        assert_eq!(second.value.previous.latest_video_id, 100);
        assert_eq!(second.value.current.latest_video_id, 105);

        let reloaded = StateStore::load(&path).await.unwrap();
        assert_eq!(reloaded.get("abc").await, Some(second.value.current));
    }

    #[tokio::test]
    async fn test_note_failure_creates_record_and_is_edge_triggered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::load(dir.path().join("state.json")).await.unwrap();

        assert!(store.note_failure("x", FailureReason::AccessDenied).await.value);
        assert!(!store.note_failure("x", FailureReason::AccessDenied).await.value);

        let state = store.get("x").await.unwrap();
        assert_eq!(state.latest_video_id, -1);
        assert_eq!(state.previous_error_reason, Some(FailureReason::AccessDenied));
    }

    #[tokio::test]
    async fn test_retain_accounts_drops_unwatched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::load(dir.path().join("state.json")).await.unwrap();
        for account in ["a", "b", "c"] {
            let _ = store.update(account, &content(1, false)).await;
        }

        let keep: BTreeSet<String> = ["b".to_string()].into_iter().collect();
        let removed = store.retain_accounts(&keep).await;
        assert_eq!(removed.value, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(store.accounts().await, vec!["b".to_string()]);

        assert!(store.remove("b").await.value.is_some());
        assert!(store.remove("b").await.value.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"[broken").await.unwrap();

        let store = StateStore::load(&path).await.unwrap();
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_memory() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("state.json");
        tokio::fs::create_dir_all(&path).await.unwrap();

        let store = StateStore::load(dir.path().join("state.json")).await;
        // Reading a directory is an IO error, not corruption.
        assert!(store.is_err());

        let store = StateStore {
            path,
            accounts: Mutex::new(BTreeMap::new()),
        };
        let mutation = store.update("abc", &content(3, false)).await;
        assert!(!mutation.is_durable());
        assert_eq!(store.get("abc").await.unwrap().latest_video_id, 3);
    }
}
