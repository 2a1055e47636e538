//! Per-account durable state.

use chrono::{DateTime, Utc};
use profile_scraper::{FailureReason, PageFacts};
use serde::{Deserialize, Serialize};

/// Video id stored before an account's first successful content poll.
pub const UNKNOWN_VIDEO_ID: i64 = -1;

/// Last known public state of a watched account.
///
/// `was_*` always holds the `is_*` value from the previous successful update
/// of the same kind; skipped and failed polls never shift it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountState {
    #[serde(rename = "latestVideoID")]
    pub latest_video_id: i64,
    pub was_live: bool,
    pub is_live: bool,
    pub was_available: bool,
    pub is_available: bool,
    /// Whether a monitor poll has established the availability baseline.
    /// Records written before this field existed already have one.
    #[serde(default = "baseline_present")]
    pub availability_known: bool,
    pub previous_error_reason: Option<FailureReason>,
    pub error_already_reported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_went_live_at: Option<DateTime<Utc>>,
}

impl Default for AccountState {
    fn default() -> Self {
        Self {
            latest_video_id: UNKNOWN_VIDEO_ID,
            was_live: false,
            is_live: false,
            was_available: true,
            is_available: true,
            availability_known: false,
            previous_error_reason: None,
            error_already_reported: false,
            last_went_live_at: None,
        }
    }
}

fn baseline_present() -> bool {
    true
}

impl AccountState {
    /// Whether no content poll has succeeded for this account yet.
    pub fn is_first_observation(&self) -> bool {
        self.latest_video_id < 0
    }

    /// Produce the state that follows a successful poll.
    ///
    /// Content facts shift the live flags and replace the video id; monitor
    /// facts shift the availability flags. A success also closes any open
    /// error episode.
    pub fn advance(&self, facts: &PageFacts) -> AccountState {
        let mut next = self.clone();
        match facts {
            PageFacts::Content(content) => {
                next.was_live = self.is_live;
                next.is_live = content.is_live;
                next.latest_video_id = content.video_id;
            }
            PageFacts::Reachability { available } => {
                next.was_available = self.is_available;
                next.is_available = *available;
                next.availability_known = true;
            }
        }
        next.previous_error_reason = None;
        next.error_already_reported = false;
        next
    }

    /// Register a failed poll. Returns `true` when the failure opens a new
    /// error episode and should be escalated; repeats of the reason already
    /// reported stay silent until it changes.
    pub fn note_failure(&mut self, reason: FailureReason) -> bool {
        if self.error_already_reported && self.previous_error_reason == Some(reason) {
            return false;
        }
        self.previous_error_reason = Some(reason);
        self.error_already_reported = true;
        true
    }
}
