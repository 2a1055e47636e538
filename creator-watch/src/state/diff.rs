//! Diffing of successive account states.

use profile_scraper::PageFacts;
use serde::{Deserialize, Serialize};

use super::AccountState;

/// A real state transition worth telling subscribers about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// The previously newest video is gone.
    VideoRemoved { video_id: i64 },
    /// A newer video appeared.
    NewUpload { video_id: i64, caption: String },
    /// The account started a live stream.
    WentLive,
    /// The account can be reached again.
    BecameAvailable,
    /// The account can no longer be reached.
    BecameUnavailable,
}

impl Change {
    pub fn kind(&self) -> &'static str {
        match self {
            Change::VideoRemoved { .. } => "video_removed",
            Change::NewUpload { .. } => "new_upload",
            Change::WentLive => "went_live",
            Change::BecameAvailable => "became_available",
            Change::BecameUnavailable => "became_unavailable",
        }
    }
}

/// Compare the state before and after a successful poll.
///
/// `current` must be `previous.advance(facts)`. The first content observation
/// of an account never yields a video change.
pub fn diff(previous: &AccountState, current: &AccountState, facts: &PageFacts) -> Vec<Change> {
    let mut changes = Vec::new();

    match facts {
        PageFacts::Content(content) => {
            let old = previous.latest_video_id;
            let new = current.latest_video_id;
            if !previous.is_first_observation() {
                if old > new {
                    changes.push(Change::VideoRemoved { video_id: old });
                } else if old < new {
                    changes.push(Change::NewUpload {
                        video_id: new,
                        caption: content.caption.clone(),
                    });
                }
            }

            if !current.was_live && current.is_live {
                changes.push(Change::WentLive);
            }
        }
        PageFacts::Reachability { .. } => {
            // The first monitor poll only sets the baseline.
            if previous.availability_known && current.was_available != current.is_available {
                changes.push(if current.is_available {
                    Change::BecameAvailable
                } else {
                    Change::BecameUnavailable
                });
            }
        }
    }

    changes
}
